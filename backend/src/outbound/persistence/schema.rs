//! Diesel table definitions for the schedule tables.
//!
//! Must match `backend/migrations` exactly; regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// One row per schedule; unique per (service, line).
    transit_schedules (id) {
        /// Surrogate key.
        id -> Int4,
        /// External identity.
        uuid -> Uuid,
        service_id -> Uuid,
        line_id -> Uuid,
        allow_seconds_based_schedules -> Bool,
        is_frozen -> Bool,
        periods_group_shortname -> Nullable<Text>,
        /// Set by the database on insert.
        created_at -> Timestamptz,
        /// Null until the first update.
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Periods, cascading from their schedule.
    transit_schedule_periods (id) {
        id -> Int4,
        uuid -> Uuid,
        schedule_id -> Int4,
        start_at_hour -> Float8,
        end_at_hour -> Float8,
        custom_start_at_str -> Nullable<Text>,
        custom_end_at_str -> Nullable<Text>,
        interval_seconds -> Nullable<Int4>,
        number_of_units -> Nullable<Int4>,
        outbound_path_id -> Nullable<Uuid>,
        inbound_path_id -> Nullable<Uuid>,
        period_shortname -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Trips, cascading from their period.
    transit_schedule_trips (id) {
        id -> Int4,
        uuid -> Uuid,
        schedule_period_id -> Int4,
        path_id -> Uuid,
        unit_id -> Nullable<Uuid>,
        block_id -> Nullable<Uuid>,
        departure_time_seconds -> Int4,
        arrival_time_seconds -> Int4,
        seated_capacity -> Nullable<Int4>,
        total_capacity -> Nullable<Int4>,
        /// One entry per path node; the first is null.
        node_arrival_times_seconds -> Array<Nullable<Int4>>,
        /// One entry per path node; the last is null.
        node_departure_times_seconds -> Array<Nullable<Int4>>,
        nodes_can_board -> Array<Bool>,
        nodes_can_unboard -> Array<Bool>,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(transit_schedule_periods -> transit_schedules (schedule_id));
diesel::joinable!(transit_schedule_trips -> transit_schedule_periods (schedule_period_id));

diesel::allow_tables_to_appear_in_same_query!(
    transit_schedules,
    transit_schedule_periods,
    transit_schedule_trips,
);
