diesel::table! {
    business_units (id) {
        id -> Uuid,
        name -> Text,
        city -> Text,
        address -> Nullable<Text>,
        lat -> Nullable<Float8>,
        lon -> Nullable<Float8>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    managers (id) {
        id -> Uuid,
        full_name -> Text,
        email -> Nullable<Text>,
        business_unit_id -> Uuid,
        is_vip_skill -> Bool,
        is_chief_spec -> Bool,
        languages -> Array<Text>,
        max_load -> Int4,
        current_load -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        external_id -> Nullable<Text>,
        subject -> Text,
        body -> Text,
        client_name -> Nullable<Text>,
        client_segment -> Nullable<Text>,
        source_channel -> Nullable<Text>,
        status -> Text,
        raw_address -> Nullable<Text>,
        attachments -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_ai (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        #[sql_name = "type"]
        ticket_type -> Nullable<Text>,
        sentiment -> Nullable<Text>,
        priority_1_10 -> Nullable<Int4>,
        lang -> Text,
        summary -> Nullable<Text>,
        recommended_actions -> Jsonb,
        lat -> Nullable<Float8>,
        lon -> Nullable<Float8>,
        geo_status -> Text,
        confidence_type -> Nullable<Float8>,
        confidence_sentiment -> Nullable<Float8>,
        confidence_priority -> Nullable<Float8>,
        processing_ms -> Nullable<Int4>,
        enriched_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_assignment (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        manager_id -> Uuid,
        business_unit_id -> Uuid,
        office_id -> Uuid,
        routing_bucket -> Text,
        routing_reason -> Nullable<Text>,
        is_current -> Bool,
        assigned_at -> Timestamptz,
    }
}

diesel::table! {
    rr_pointer (id) {
        id -> Uuid,
        business_unit_id -> Uuid,
        skill_group -> Text,
        last_manager_idx -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    audit_log (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        step -> Text,
        input_data -> Nullable<Jsonb>,
        output_data -> Nullable<Jsonb>,
        decision -> Text,
        candidates -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(managers -> business_units (business_unit_id));
diesel::joinable!(ticket_ai -> tickets (ticket_id));
diesel::joinable!(audit_log -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    business_units,
    managers,
    tickets,
    ticket_ai,
    ticket_assignment,
    rr_pointer,
    audit_log,
);
