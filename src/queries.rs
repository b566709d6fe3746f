//! Queries that operate on the catalog and contain core logic; queries
//! related to the database itself (pragmas, migrations) are handled in the
//! db module. Relationship loads are explicit and fully materialized —
//! there is no lazy loading, so the data-fetch cost is visible at each
//! call site.

use std::collections::HashMap;

use diesel::dsl::{exists, select};
use diesel::prelude::*;

use crate::models::{Image, NewImage, NewImageTag, NewTag, Tag};

/// All images, ordered by id ascending.
pub fn list_images(conn: &mut SqliteConnection) -> QueryResult<Vec<Image>> {
    use crate::schema::images;
    images::table
        .order(images::id.asc())
        .select(Image::as_select())
        .load(conn)
}

/// All images with their tags materialized in one pass, ordered by image id.
/// Tags keep their stored (insertion) order.
pub fn list_images_with_tags(
    conn: &mut SqliteConnection,
) -> QueryResult<Vec<(Image, Vec<Tag>)>> {
    use crate::schema::{image_tags, tags};

    let images = list_images(conn)?;

    let pairs: Vec<(i32, Tag)> = image_tags::table
        .inner_join(tags::table)
        .select((image_tags::image_id, Tag::as_select()))
        .load(conn)?;

    let mut by_image: HashMap<i32, Vec<Tag>> = HashMap::new();
    for (image_id, tag) in pairs {
        by_image.entry(image_id).or_default().push(tag);
    }

    Ok(images
        .into_iter()
        .map(|image| {
            let tags = by_image.remove(&image.id).unwrap_or_default();
            (image, tags)
        })
        .collect())
}

pub fn get_image(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Image>> {
    use crate::schema::images;
    images::table
        .find(id)
        .select(Image::as_select())
        .first(conn)
        .optional()
}

pub fn get_tag(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Tag>> {
    use crate::schema::tags;
    tags::table
        .find(id)
        .select(Tag::as_select())
        .first(conn)
        .optional()
}

/// Tags with at least one associated image, ordered by name. Orphaned tags
/// are never deleted; they simply drop out of this listing.
pub fn list_visible_tags(conn: &mut SqliteConnection) -> QueryResult<Vec<Tag>> {
    use crate::schema::{image_tags, tags};
    tags::table
        .filter(exists(
            image_tags::table.filter(image_tags::tag_id.eq(tags::id)),
        ))
        .order(tags::name.asc())
        .select(Tag::as_select())
        .load(conn)
}

pub fn list_all_tags(conn: &mut SqliteConnection) -> QueryResult<Vec<Tag>> {
    use crate::schema::tags;
    tags::table.select(Tag::as_select()).load(conn)
}

/// An image's tags in stored (insertion) order. The join table carries no
/// sequence column, so its rowid stands in for insertion order.
pub fn tags_for_image(conn: &mut SqliteConnection, image_id: i32) -> QueryResult<Vec<Tag>> {
    use crate::schema::{image_tags, tags};
    image_tags::table
        .inner_join(tags::table)
        .filter(image_tags::image_id.eq(image_id))
        .order(diesel::dsl::sql::<diesel::sql_types::BigInt>("image_tags.rowid"))
        .select(Tag::as_select())
        .load(conn)
}

/// A tag's images, ordered by image id ascending.
pub fn images_for_tag(conn: &mut SqliteConnection, tag_id: i32) -> QueryResult<Vec<Image>> {
    use crate::schema::{image_tags, images};
    image_tags::table
        .inner_join(images::table)
        .filter(image_tags::tag_id.eq(tag_id))
        .order(images::id.asc())
        .select(Image::as_select())
        .load(conn)
}

pub fn count_images(conn: &mut SqliteConnection) -> QueryResult<i64> {
    use crate::schema::images;
    images::table.count().get_result(conn)
}

pub fn image_exists_with_file_path(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> QueryResult<bool> {
    use crate::schema::images;
    select(exists(
        images::table.filter(images::file_path.eq(file_path)),
    ))
    .get_result(conn)
}

pub fn image_exists_with_file_name(
    conn: &mut SqliteConnection,
    file_name: &str,
) -> QueryResult<bool> {
    use crate::schema::images;
    select(exists(
        images::table.filter(images::file_name.eq(file_name)),
    ))
    .get_result(conn)
}

pub fn insert_image(conn: &mut SqliteConnection, image: &NewImage) -> QueryResult<i32> {
    use crate::schema::images;
    diesel::insert_into(images::table)
        .values(image)
        .returning(images::id)
        .get_result(conn)
}

pub fn insert_tag(conn: &mut SqliteConnection, tag: &NewTag) -> QueryResult<i32> {
    use crate::schema::tags;
    diesel::insert_into(tags::table)
        .values(tag)
        .returning(tags::id)
        .get_result(conn)
}

pub fn add_image_tag(
    conn: &mut SqliteConnection,
    image_id: i32,
    tag_id: i32,
) -> QueryResult<()> {
    use crate::schema::image_tags;
    diesel::insert_into(image_tags::table)
        .values(NewImageTag { image_id, tag_id })
        .execute(conn)?;
    Ok(())
}

/// Deletes an image row; the join rows cascade, the tags survive.
pub fn delete_image(conn: &mut SqliteConnection, id: i32) -> QueryResult<()> {
    use crate::schema::images;
    diesel::delete(images::table.find(id)).execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_catalog;
    use crate::models::{NewImage, NewTag};

    fn seed_image(conn: &mut SqliteConnection, file_name: &str) -> i32 {
        insert_image(
            conn,
            &NewImage {
                file_path: file_name,
                file_name,
                file_size: 1234,
                width: 1920,
                height: 1080,
                format: "PNG",
            },
        )
        .unwrap()
    }

    #[test]
    fn visible_tags_excludes_orphans_and_sorts_by_name() {
        let (_tmp, mut conn) = temp_catalog();
        let image_id = seed_image(&mut conn, "a.png");
        let zebra = insert_tag(&mut conn, &NewTag { name: "zebra" }).unwrap();
        let aster = insert_tag(&mut conn, &NewTag { name: "aster" }).unwrap();
        insert_tag(&mut conn, &NewTag { name: "orphan" }).unwrap();
        add_image_tag(&mut conn, image_id, zebra).unwrap();
        add_image_tag(&mut conn, image_id, aster).unwrap();

        let visible = list_visible_tags(&mut conn).unwrap();
        let names: Vec<&str> = visible.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["aster", "zebra"]);
    }

    #[test]
    fn tags_for_image_keeps_insertion_order() {
        let (_tmp, mut conn) = temp_catalog();
        let image_id = seed_image(&mut conn, "a.png");
        let v = insert_tag(&mut conn, &NewTag { name: "v" }).unwrap();
        let sunset = insert_tag(&mut conn, &NewTag { name: "sunset" }).unwrap();
        add_image_tag(&mut conn, image_id, v).unwrap();
        add_image_tag(&mut conn, image_id, sunset).unwrap();

        let tags = tags_for_image(&mut conn, image_id).unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["v", "sunset"]);
    }

    #[test]
    fn tags_for_image_orders_by_association_not_tag_id() {
        let (_tmp, mut conn) = temp_catalog();
        let image_id = seed_image(&mut conn, "a.png");
        // Tag rows created in the opposite order of their association.
        let sunset = insert_tag(&mut conn, &NewTag { name: "sunset" }).unwrap();
        let v = insert_tag(&mut conn, &NewTag { name: "v" }).unwrap();
        add_image_tag(&mut conn, image_id, v).unwrap();
        add_image_tag(&mut conn, image_id, sunset).unwrap();

        let tags = tags_for_image(&mut conn, image_id).unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["v", "sunset"]);
    }

    #[test]
    fn delete_image_cascades_join_rows_but_keeps_tags() {
        let (_tmp, mut conn) = temp_catalog();
        let image_id = seed_image(&mut conn, "a.png");
        let tag_id = insert_tag(&mut conn, &NewTag { name: "v" }).unwrap();
        add_image_tag(&mut conn, image_id, tag_id).unwrap();

        delete_image(&mut conn, image_id).unwrap();

        assert!(get_image(&mut conn, image_id).unwrap().is_none());
        assert!(tags_for_image(&mut conn, image_id).unwrap().is_empty());
        // Tag row survives, it is just no longer visible.
        assert!(get_tag(&mut conn, tag_id).unwrap().is_some());
        assert!(list_visible_tags(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn images_for_tag_sorted_by_id() {
        let (_tmp, mut conn) = temp_catalog();
        let b = seed_image(&mut conn, "b.png");
        let a = seed_image(&mut conn, "a.png");
        let tag_id = insert_tag(&mut conn, &NewTag { name: "v" }).unwrap();
        // Associate in reverse id order.
        add_image_tag(&mut conn, a, tag_id).unwrap();
        add_image_tag(&mut conn, b, tag_id).unwrap();

        let images = images_for_tag(&mut conn, tag_id).unwrap();
        let ids: Vec<i32> = images.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![b.min(a), b.max(a)]);
    }

    #[test]
    fn list_images_with_tags_materializes_everything() {
        let (_tmp, mut conn) = temp_catalog();
        let with_tags = seed_image(&mut conn, "tagged.png");
        let bare = seed_image(&mut conn, "bare.png");
        let tag_id = insert_tag(&mut conn, &NewTag { name: "v" }).unwrap();
        add_image_tag(&mut conn, with_tags, tag_id).unwrap();

        let all = list_images_with_tags(&mut conn).unwrap();
        assert_eq!(all.len(), 2);
        for (image, tags) in all {
            if image.id == with_tags {
                assert_eq!(tags.len(), 1);
            } else {
                assert_eq!(image.id, bare);
                assert!(tags.is_empty());
            }
        }
    }

    #[test]
    fn existence_checks_by_path_and_name() {
        let (_tmp, mut conn) = temp_catalog();
        insert_image(
            &mut conn,
            &NewImage {
                file_path: "ab12cd.png",
                file_name: "sunset.png",
                file_size: 10,
                width: 1,
                height: 1,
                format: "PNG",
            },
        )
        .unwrap();

        assert!(image_exists_with_file_path(&mut conn, "ab12cd.png").unwrap());
        assert!(!image_exists_with_file_path(&mut conn, "sunset.png").unwrap());
        assert!(image_exists_with_file_name(&mut conn, "sunset.png").unwrap());
        assert!(!image_exists_with_file_name(&mut conn, "ab12cd.png").unwrap());
    }
}
