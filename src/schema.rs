diesel::table! {
    agents (id) {
        id -> Integer,
        agent_id -> Text,
        created_utc -> Text,
        last_seen_utc -> Text,
    }
}

diesel::table! {
    drive_usages (id) {
        id -> Integer,
        agent_key -> Integer,
        timestamp_utc -> Text,
        drive_letter -> Text,
        total_space_gb -> Double,
        free_space_gb -> Double,
        used_percent -> Double,
    }
}

diesel::table! {
    alert_entries (id) {
        id -> Integer,
        agent_key -> Integer,
        timestamp_utc -> Text,
        drive_letter -> Text,
        level -> Text,
        message -> Text,
    }
}

diesel::joinable!(drive_usages -> agents (agent_key));
diesel::joinable!(alert_entries -> agents (agent_key));
diesel::allow_tables_to_appear_in_same_query!(agents, drive_usages, alert_entries);
