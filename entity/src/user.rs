use sea_orm::entity::prelude::*;

/// A row of the `users` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Assigned by storage on insert, never reused.
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_type = "String(Some(32))")]
    pub name: String,
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub email: String,
    pub created_at: DateTimeWithTimeZone,
    /// `None` until the first update.
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
