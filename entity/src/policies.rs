use sea_orm::prelude::{DateTimeWithTimeZone, *};
use uuid::Uuid;

/// One granted policy per `(subject, system, action)`. `resources` holds the
/// JSON-encoded resource expression list.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "policies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: String,
    pub system: String,
    pub action_id: String,
    #[sea_orm(column_type = "Text")]
    pub resources: String,
    pub expired_at: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
