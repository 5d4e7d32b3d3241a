use serde::{Deserialize, Serialize};

/// Declared type of an extracted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    /// JSON number, or a string in plain decimal notation.
    Number,
    Boolean,
    /// ISO 8601 calendar date (`YYYY-MM-DD`).
    Date,
    Object(ExtractionSchema),
    Array { items: Box<FieldType> },
    /// Accepted as-is without validation.
    Any,
}

impl FieldType {
    pub fn array_of(items: FieldType) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Object(_) => "object",
            Self::Array { .. } => "array",
            Self::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// The fields a terminal payload must (or may) carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Receipt / invoice payload produced by the expense extraction endpoint.
    pub fn expense() -> Self {
        let item = ExtractionSchema::new()
            .optional("name", FieldType::Text)
            .optional("quantity", FieldType::Number)
            .optional("unit_price", FieldType::Number)
            .optional("subtotal", FieldType::Number);

        let expense = ExtractionSchema::new()
            .optional("shop_name", FieldType::Text)
            .optional("shop_address", FieldType::Text)
            .optional("date", FieldType::Date)
            .optional("expense_category", FieldType::Text)
            .optional("currency", FieldType::Text)
            .optional("total_amount", FieldType::Number)
            .optional("items", FieldType::array_of(FieldType::Object(item)));

        ExtractionSchema::new()
            .required("image_type", FieldType::Text)
            .optional("expense", FieldType::Object(expense))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_order_and_lookup() {
        let schema = ExtractionSchema::new()
            .required("total", FieldType::Number)
            .optional("date", FieldType::Date);
        assert_eq!(schema.fields.len(), 2);
        assert!(schema.field("total").unwrap().required);
        assert!(!schema.field("date").unwrap().required);
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn test_expense_schema_shape() {
        let schema = ExtractionSchema::expense();
        assert!(schema.field("image_type").unwrap().required);
        let expense = schema.field("expense").unwrap();
        let FieldType::Object(inner) = &expense.field_type else {
            panic!("expense should be an object");
        };
        assert_eq!(inner.field("total_amount").unwrap().field_type, FieldType::Number);
        assert_eq!(inner.field("date").unwrap().field_type, FieldType::Date);
    }

    #[test]
    fn test_schema_serde_shape() {
        let schema =
            ExtractionSchema::new().required("lines", FieldType::array_of(FieldType::Text));
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["fields"][0]["field_type"]["type"], "array");
        assert_eq!(json["fields"][0]["field_type"]["items"]["type"], "text");
        let back: ExtractionSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }
}
