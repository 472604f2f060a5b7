table! {
    messages (id) {
        id -> Varchar,
        kind -> Varchar,
        master_id -> Varchar,
        author_id -> Varchar,
        order_id -> Varchar,
        reply_id -> Nullable<Varchar>,
        has_read -> Bool,
        create_at -> Timestamptz,
    }
}

table! {
    order_collects (id) {
        id -> Varchar,
        user_id -> Varchar,
        order_id -> Varchar,
        create_at -> Timestamptz,
    }
}

table! {
    orders (id) {
        id -> Varchar,
        title -> Varchar,
        content -> Text,
        tab -> Varchar,
        author_id -> Varchar,
        reply_count -> Int4,
        visit_count -> Int4,
        collect_count -> Int4,
        last_reply -> Nullable<Varchar>,
        last_reply_at -> Timestamptz,
        top -> Bool,
        good -> Bool,
        lock -> Bool,
        deleted -> Bool,
        create_at -> Timestamptz,
        update_at -> Timestamptz,
    }
}

table! {
    replies (id) {
        id -> Varchar,
        order_id -> Varchar,
        author_id -> Varchar,
        content -> Text,
        deleted -> Bool,
        create_at -> Timestamptz,
    }
}

table! {
    users (id) {
        id -> Varchar,
        loginname -> Varchar,
        token -> Varchar,
        score -> Int4,
        order_count -> Int4,
        reply_count -> Int4,
        collect_order_count -> Int4,
        is_admin -> Bool,
    }
}

joinable!(replies -> orders (order_id));

allow_tables_to_appear_in_same_query!(messages, order_collects, orders, replies, users,);
