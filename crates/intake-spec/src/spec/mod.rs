pub mod field;
pub mod questionnaire;

pub use field::{AutoCalculate, Bound, BoundKeyword, FieldDescriptor, FieldOption, FieldType};
pub use questionnaire::{
    BUILTIN_QUESTIONNAIRE, ConditionalFields, FieldEntry, Gate, MarriageRule, QuestionnaireSchema,
    SchemaError, SectionSchema,
};
