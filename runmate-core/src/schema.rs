use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        profile_picture -> Nullable<Text>,
        rating_stats -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

table! {
    chats (id) {
        id -> Uuid,
        chat_type -> Text,
        direct_key -> Nullable<Text>,
        participants -> Array<Uuid>,
        admins -> Array<Uuid>,
        name -> Nullable<Text>,
        description -> Nullable<Text>,
        avatar -> Nullable<Text>,
        created_by -> Uuid,
        last_message -> Nullable<Jsonb>,
        last_activity -> Timestamptz,
        is_active -> Bool,
        run_event_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

table! {
    chat_messages (id) {
        id -> Uuid,
        seq -> BigInt,
        chat_id -> Uuid,
        sender -> Uuid,
        content -> Text,
        message_type -> Text,
        is_edited -> Bool,
        edited_at -> Nullable<Timestamptz>,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        reply_to -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

table! {
    chat_message_reads (message_id, user_id) {
        message_id -> Uuid,
        user_id -> Uuid,
        read_at -> Timestamptz,
    }
}

table! {
    run_events (id) {
        id -> Uuid,
        host -> Uuid,
        title -> Text,
        description -> Text,
        location_name -> Text,
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        distance_km -> Double,
        pace_seconds_per_km -> Integer,
        event_date -> Timestamptz,
        max_participants -> Integer,
        participants -> Array<Uuid>,
        pending_requests -> Array<Uuid>,
        status -> Text,
        chat_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    ratings (id) {
        id -> Uuid,
        rater -> Uuid,
        ratee -> Uuid,
        related_event -> Uuid,
        categories -> Jsonb,
        comment -> Nullable<Text>,
        overall_rating -> SmallInt,
        is_approved -> Bool,
        has_report -> Bool,
        report_reason -> Nullable<Text>,
        report_details -> Nullable<Text>,
        report_handled -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    outbox_events (id) {
        id -> BigInt,
        event_type -> Text,
        event_data -> Jsonb,
        aggregate_id -> Nullable<Text>,
        created_at -> Timestamptz,
        processed_at -> Nullable<Timestamptz>,
        published_at -> Nullable<Timestamptz>,
        retry_count -> Integer,
        error_message -> Nullable<Text>,
    }
}

joinable!(chat_messages -> chats (chat_id));
joinable!(chat_message_reads -> chat_messages (message_id));

allow_tables_to_appear_in_same_query!(
    users,
    chats,
    chat_messages,
    chat_message_reads,
    run_events,
    ratings,
    outbox_events,
);
