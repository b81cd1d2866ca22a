use serde_json::{Value, json};

use graphlink_cache::{
    CacheEngine, DistanceModel, FieldPolicy, FieldReading, stable_bucket,
};

fn restaurant_engine() -> CacheEngine {
    let engine = CacheEngine::new();
    engine.register_key_fields("RestaurantPreview", ["_id"]);
    engine.register_field_policy(
        "RestaurantPreview",
        "freeDelivery",
        FieldPolicy::stable_flag_above("_id", 5),
    );
    engine.register_field_policy(
        "RestaurantPreview",
        "acceptVouchers",
        FieldPolicy::stable_flag_below("_id", 5),
    );
    engine.register_field_policy(
        "RestaurantPreview",
        "distanceWithCurrentLocation",
        FieldPolicy::geo_distance("location", DistanceModel::Haversine),
    );
    engine
}

#[test]
fn same_entity_from_two_queries_merges_into_one_record() {
    let engine = restaurant_engine();

    // A list query sees the name; a detail query sees the rating.
    engine
        .write(
            "RestaurantPreview",
            &json!({ "_id": "r1", "name": "Trattoria" }),
            &Value::Null,
        )
        .expect("first write");
    engine
        .write(
            "RestaurantPreview",
            &json!({ "_id": "r1", "rating": 4.5 }),
            &Value::Null,
        )
        .expect("second write");

    assert_eq!(engine.len(), 1);
    assert_eq!(
        engine.read("RestaurantPreview", "r1", "name", &Value::Null),
        FieldReading::Value(json!("Trattoria"))
    );
    assert_eq!(
        engine.read("RestaurantPreview", "r1", "rating", &Value::Null),
        FieldReading::Value(json!(4.5))
    );
}

#[test]
fn unpoliced_field_is_fully_replaced() {
    let engine = CacheEngine::new();
    engine
        .write("Category", &json!({ "id": "c1", "foods": ["a", "b"] }), &Value::Null)
        .expect("write");
    engine
        .write("Category", &json!({ "id": "c1", "foods": ["c"] }), &Value::Null)
        .expect("write");

    assert_eq!(
        engine.read("Category", "c1", "foods", &Value::Null),
        FieldReading::Value(json!(["c"]))
    );
}

#[test]
fn replace_policy_shows_only_latest_fetch() {
    let engine = CacheEngine::new();
    engine.register_field_policy("Food", "variations", FieldPolicy::replace());
    engine
        .write(
            "Food",
            &json!({ "id": "f1", "variations": ["small", "large"] }),
            &Value::Null,
        )
        .expect("write");
    engine
        .write("Food", &json!({ "id": "f1", "variations": ["regular"] }), &Value::Null)
        .expect("write");

    assert_eq!(
        engine.read("Food", "f1", "variations", &Value::Null),
        FieldReading::Value(json!(["regular"]))
    );
}

#[test]
fn paginated_field_concatenates_pages_by_offset() {
    let engine = CacheEngine::new();
    engine.register_field_policy("Query", "orders", FieldPolicy::offset_limit());

    let first_page: Vec<Value> = (0..10).map(|i| json!({ "order": i })).collect();
    engine
        .write(
            "Query",
            &json!({ "id": "ROOT", "orders": first_page }),
            &json!({ "offset": 0, "limit": 10 }),
        )
        .expect("first page");

    let second_page: Vec<Value> = (10..20).map(|i| json!({ "order": i })).collect();
    engine
        .write(
            "Query",
            &json!({ "id": "ROOT", "orders": second_page }),
            &json!({ "offset": 10, "limit": 10 }),
        )
        .expect("second page");

    let orders = engine
        .read("Query", "ROOT", "orders", &Value::Null)
        .into_value()
        .expect("orders");
    let orders = orders.as_array().expect("list");
    assert_eq!(orders.len(), 20);
    for (index, item) in orders.iter().enumerate() {
        assert_eq!(item, &json!({ "order": index }));
    }
}

#[test]
fn derived_flags_are_stable_across_reads_and_eviction() {
    let engine = restaurant_engine();
    let payload = json!({ "_id": "abc123", "name": "Trattoria" });
    engine
        .write("RestaurantPreview", &payload, &Value::Null)
        .expect("write");

    let bucket = stable_bucket("abc123", 10);
    let expected_free = json!(bucket > 5);
    let expected_vouchers = json!(bucket < 5);

    for _ in 0..25 {
        assert_eq!(
            engine.read("RestaurantPreview", "abc123", "freeDelivery", &Value::Null),
            FieldReading::Value(expected_free.clone())
        );
        assert_eq!(
            engine.read("RestaurantPreview", "abc123", "acceptVouchers", &Value::Null),
            FieldReading::Value(expected_vouchers.clone())
        );
    }

    // Eviction plus a re-fetch of the identical payload must not flip either flag.
    assert!(engine.evict("RestaurantPreview", "abc123"));
    engine
        .write("RestaurantPreview", &payload, &Value::Null)
        .expect("rewrite");
    assert_eq!(
        engine.read("RestaurantPreview", "abc123", "freeDelivery", &Value::Null),
        FieldReading::Value(expected_free)
    );
    assert_eq!(
        engine.read("RestaurantPreview", "abc123", "acceptVouchers", &Value::Null),
        FieldReading::Value(expected_vouchers)
    );
}

#[test]
fn derived_flags_never_agree_on_true() {
    let engine = restaurant_engine();
    for i in 0..100 {
        let id = format!("restaurant-{i}");
        engine
            .write("RestaurantPreview", &json!({ "_id": id }), &Value::Null)
            .expect("write");
        let free = engine
            .read("RestaurantPreview", &id, "freeDelivery", &Value::Null)
            .into_value()
            .expect("flag");
        let vouchers = engine
            .read("RestaurantPreview", &id, "acceptVouchers", &Value::Null)
            .into_value()
            .expect("flag");
        assert!(
            !(free == json!(true) && vouchers == json!(true)),
            "{id} reported both flags"
        );
    }
}

#[test]
fn distance_reads_location_and_variables() {
    let engine = restaurant_engine();
    engine
        .write(
            "RestaurantPreview",
            &json!({
                "_id": "r1",
                "location": { "coordinates": [48.8566, 2.3522] }
            }),
            &Value::Null,
        )
        .expect("write");

    // Reading from the same point: zero distance.
    let at_origin = engine
        .read(
            "RestaurantPreview",
            "r1",
            "distanceWithCurrentLocation",
            &json!({ "latitude": 48.8566, "longitude": 2.3522 }),
        )
        .into_value()
        .expect("distance");
    assert_eq!(at_origin, json!(0.0));

    // Missing viewer coordinates: unavailable, not zero.
    assert_eq!(
        engine.read(
            "RestaurantPreview",
            "r1",
            "distanceWithCurrentLocation",
            &json!({ "latitude": 48.8566 }),
        ),
        FieldReading::Value(Value::Null)
    );
}

#[test]
fn distance_with_missing_location_field_is_null() {
    let engine = restaurant_engine();
    engine
        .write("RestaurantPreview", &json!({ "_id": "r9" }), &Value::Null)
        .expect("write");

    assert_eq!(
        engine.read(
            "RestaurantPreview",
            "r9",
            "distanceWithCurrentLocation",
            &json!({ "latitude": 1.0, "longitude": 2.0 }),
        ),
        FieldReading::Value(Value::Null)
    );
}

#[test]
fn read_is_pure_for_fixed_state_and_variables() {
    let engine = restaurant_engine();
    engine
        .write(
            "RestaurantPreview",
            &json!({
                "_id": "r1",
                "location": { "coordinates": [10.0, 20.0] }
            }),
            &Value::Null,
        )
        .expect("write");

    let variables = json!({ "latitude": 11.0, "longitude": 21.0 });
    let first = engine.read(
        "RestaurantPreview",
        "r1",
        "distanceWithCurrentLocation",
        &variables,
    );
    for _ in 0..10 {
        assert_eq!(
            engine.read(
                "RestaurantPreview",
                "r1",
                "distanceWithCurrentLocation",
                &variables,
            ),
            first
        );
    }
}
