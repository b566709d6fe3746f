use diesel::prelude::*;

/// A cataloged original image. `file_path` is the on-disk path relative to
/// the images root and is unique; `file_name` is the display name the file
/// had in its source catalog (the importer dedupes on it). Dimensions and
/// size are computed at creation time and never mutated afterwards.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::images)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Image {
    pub id: i32,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i32,
    pub width: i32,
    pub height: i32,
    pub format: String,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

// Timestamps are left to the SQL defaults.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::images)]
pub struct NewImage<'a> {
    pub file_path: &'a str,
    pub file_name: &'a str,
    pub file_size: i32,
    pub width: i32,
    pub height: i32,
    pub format: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Tag {
    pub id: i32,
    pub name: String,
    pub created_at: time::PrimitiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::tags)]
pub struct NewTag<'a> {
    pub name: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::image_tags)]
pub struct NewImageTag {
    pub image_id: i32,
    pub tag_id: i32,
}
