diesel::table! {
    image_tags (image_id, tag_id) {
        image_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::table! {
    images (id) {
        id -> Integer,
        file_path -> Text,
        file_name -> Text,
        file_size -> Integer,
        width -> Integer,
        height -> Integer,
        format -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    tags (id) {
        id -> Integer,
        name -> Text,
        created_at -> Timestamp,
    }
}

diesel::joinable!(image_tags -> images (image_id));
diesel::joinable!(image_tags -> tags (tag_id));

diesel::allow_tables_to_appear_in_same_query!(image_tags, images, tags);
