//! Class metadata
//!
//! The compiler needs a handful of facts about the persisted class: where it
//! is stored, how fields map to columns, which columns carry a secondary
//! index, and for single-table hierarchies which discriminator values belong
//! to the class.

use serde::{Deserialize, Serialize};

use crate::codec::ComparatorType;
use crate::query::{QueryError, QueryResult};

/// Mapping facts for one persisted class
pub trait ClassMetadata {
    fn class_name(&self) -> &str;

    fn column_family(&self) -> &str;

    /// Column holding the object identity
    fn identity_column(&self) -> &[u8];

    fn column_for_field(&self, field: &str) -> Option<Vec<u8>>;

    /// True if the field's column has a secondary index
    fn is_indexed(&self, field: &str) -> bool;

    fn comparator_for_column(&self, column: &[u8]) -> ComparatorType;

    /// Discriminator column, for classes in a single-table hierarchy
    fn discriminator_column(&self) -> Option<&[u8]>;

    /// Discriminator values admissible for this class, followed by those of
    /// every subclass when `include_subclasses` is set
    fn discriminator_values(&self, include_subclasses: bool) -> Vec<Vec<u8>>;
}

fn default_identity_column() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Column name; the field name when absent
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub comparator: ComparatorType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, comparator: ComparatorType) -> Self {
        Self {
            name: name.into(),
            column: None,
            indexed: false,
            comparator,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Serializable class description implementing [`ClassMetadata`].
///
/// Subclasses share the root's column family, identity column and
/// discriminator column; [`ClassDescriptor::resolve`] copies those down and
/// prepends inherited fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    #[serde(default)]
    pub column_family: String,
    #[serde(default = "default_identity_column")]
    pub identity_column: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub discriminator_column: Option<String>,
    /// Value stored for this class; the class name when absent
    #[serde(default)]
    pub discriminator_value: Option<String>,
    #[serde(default)]
    pub subclasses: Vec<ClassDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>, column_family: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_family: column_family.into(),
            identity_column: default_identity_column(),
            fields: Vec::new(),
            discriminator_column: None,
            discriminator_value: None,
            subclasses: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_discriminator(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.discriminator_column = Some(column.into());
        self.discriminator_value = Some(value.into());
        self
    }

    pub fn with_subclass(mut self, subclass: ClassDescriptor) -> Self {
        self.subclasses.push(subclass);
        self
    }

    /// Parse a hierarchy from JSON and resolve inherited mapping
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        let mut descriptor: ClassDescriptor = serde_json::from_str(json)
            .map_err(|e| QueryError::invalid_config(format!("class descriptor: {}", e)))?;
        descriptor.resolve()?;
        Ok(descriptor)
    }

    /// Propagate the mapping shared by a hierarchy down to every subclass
    pub fn resolve(&mut self) -> QueryResult<()> {
        if self.column_family.is_empty() {
            return Err(QueryError::invalid_config(format!(
                "class {} has no column family",
                self.name
            )));
        }

        let mut pending: Vec<&mut ClassDescriptor> = vec![self];
        while let Some(parent) = pending.pop() {
            let column_family = parent.column_family.clone();
            let identity_column = parent.identity_column.clone();
            let discriminator_column = parent.discriminator_column.clone();
            let inherited = parent.fields.clone();

            for child in parent.subclasses.iter_mut() {
                if child.column_family.is_empty() {
                    child.column_family = column_family.clone();
                } else if child.column_family != column_family {
                    return Err(QueryError::invalid_config(format!(
                        "subclass {} is stored in {} but its hierarchy uses {}",
                        child.name, child.column_family, column_family
                    )));
                }
                child.identity_column = identity_column.clone();
                if child.discriminator_column.is_none() {
                    child.discriminator_column = discriminator_column.clone();
                }

                let own = std::mem::take(&mut child.fields);
                let mut fields: Vec<FieldDescriptor> = inherited
                    .iter()
                    .filter(|f| !own.iter().any(|o| o.name == f.name))
                    .cloned()
                    .collect();
                fields.extend(own);
                child.fields = fields;
            }
            pending.extend(parent.subclasses.iter_mut());
        }
        Ok(())
    }

    /// Find `name` in this hierarchy
    pub fn find(&self, name: &str) -> Option<&ClassDescriptor> {
        if self.name == name {
            return Some(self);
        }
        self.subclasses.iter().find_map(|sub| sub.find(name))
    }

    fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn own_discriminator_value(&self) -> &str {
        self.discriminator_value.as_deref().unwrap_or(&self.name)
    }
}

impl ClassMetadata for ClassDescriptor {
    fn class_name(&self) -> &str {
        &self.name
    }

    fn column_family(&self) -> &str {
        &self.column_family
    }

    fn identity_column(&self) -> &[u8] {
        self.identity_column.as_bytes()
    }

    fn column_for_field(&self, field: &str) -> Option<Vec<u8>> {
        self.field(field).map(|f| f.column_name().as_bytes().to_vec())
    }

    fn is_indexed(&self, field: &str) -> bool {
        self.field(field).map(|f| f.indexed).unwrap_or(false)
    }

    fn comparator_for_column(&self, column: &[u8]) -> ComparatorType {
        self.fields
            .iter()
            .find(|f| f.column_name().as_bytes() == column)
            .map(|f| f.comparator)
            .unwrap_or_default()
    }

    fn discriminator_column(&self) -> Option<&[u8]> {
        self.discriminator_column.as_deref().map(str::as_bytes)
    }

    fn discriminator_values(&self, include_subclasses: bool) -> Vec<Vec<u8>> {
        if self.discriminator_column.is_none() {
            return Vec::new();
        }
        let mut values = vec![self.own_discriminator_value().as_bytes().to_vec()];
        if include_subclasses {
            let mut pending: Vec<&ClassDescriptor> = self.subclasses.iter().rev().collect();
            while let Some(class) = pending.pop() {
                values.push(class.own_discriminator_value().as_bytes().to_vec());
                pending.extend(class.subclasses.iter().rev());
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> ClassDescriptor {
        ClassDescriptor::from_json_str(
            r#"{
                "name": "Animal",
                "column_family": "animals",
                "discriminator_column": "type",
                "discriminator_value": "A",
                "fields": [
                    {"name": "status", "indexed": true, "comparator": "utf8"},
                    {"name": "legs", "column": "leg_count", "comparator": "integer"}
                ],
                "subclasses": [
                    {
                        "name": "Dog",
                        "discriminator_value": "D",
                        "fields": [{"name": "breed", "indexed": true, "comparator": "utf8"}],
                        "subclasses": [{"name": "Puppy"}]
                    },
                    {"name": "Cat", "discriminator_value": "C"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_field_mapping() {
        let animal = hierarchy();
        assert_eq!(animal.column_for_field("legs"), Some(b"leg_count".to_vec()));
        assert_eq!(animal.column_for_field("status"), Some(b"status".to_vec()));
        assert!(animal.is_indexed("status"));
        assert!(!animal.is_indexed("legs"));
        assert!(!animal.is_indexed("unknown"));
        assert_eq!(animal.comparator_for_column(b"leg_count"), ComparatorType::Integer);
        assert_eq!(animal.comparator_for_column(b"other"), ComparatorType::Bytes);
        assert_eq!(animal.identity_column(), b"id");
    }

    #[test]
    fn test_subclasses_inherit_mapping() {
        let animal = hierarchy();
        let dog = animal.find("Dog").unwrap();
        assert_eq!(dog.column_family(), "animals");
        assert_eq!(dog.discriminator_column(), Some(&b"type"[..]));
        assert!(dog.is_indexed("status"));
        assert!(dog.is_indexed("breed"));

        let puppy = animal.find("Puppy").unwrap();
        assert!(puppy.is_indexed("breed"));
    }

    #[test]
    fn test_discriminator_values() {
        let animal = hierarchy();
        assert_eq!(animal.discriminator_values(false), vec![b"A".to_vec()]);
        assert_eq!(
            animal.discriminator_values(true),
            vec![b"A".to_vec(), b"D".to_vec(), b"Puppy".to_vec(), b"C".to_vec()]
        );

        let dog = animal.find("Dog").unwrap();
        assert_eq!(dog.discriminator_values(true), vec![b"D".to_vec(), b"Puppy".to_vec()]);
    }

    #[test]
    fn test_no_discriminator_means_no_values() {
        let plain = ClassDescriptor::new("User", "users");
        assert!(plain.discriminator_column().is_none());
        assert!(plain.discriminator_values(true).is_empty());
    }

    #[test]
    fn test_missing_column_family_rejected() {
        let err = ClassDescriptor::from_json_str(r#"{"name": "X"}"#).unwrap_err();
        assert_eq!(err.code(), "CQ_QUERY_CONFIG_INVALID");
    }
}
