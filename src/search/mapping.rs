/// How a field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Numeric; filterable and sortable.
    Integer,
    /// Full-text searchable.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Declared field types of an index, applied once when the index is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapping {
    pub primary_key: &'static str,
    pub fields: Vec<FieldMapping>,
}

impl IndexMapping {
    /// Mapping of the posts index.
    pub fn posts() -> Self {
        Self {
            primary_key: "id",
            fields: vec![
                FieldMapping { name: "id", kind: FieldKind::Integer },
                FieldMapping { name: "title", kind: FieldKind::Text },
                FieldMapping { name: "paragraphs", kind: FieldKind::Text },
                FieldMapping { name: "authorId", kind: FieldKind::Integer },
            ],
        }
    }

    fn names_of(&self, kind: FieldKind) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.name)
            .collect()
    }

    pub fn searchable_attributes(&self) -> Vec<&'static str> {
        self.names_of(FieldKind::Text)
    }

    pub fn filterable_attributes(&self) -> Vec<&'static str> {
        self.names_of(FieldKind::Integer)
    }

    pub fn sortable_attributes(&self) -> Vec<&'static str> {
        self.names_of(FieldKind::Integer)
    }
}
