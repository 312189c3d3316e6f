use narwhal::{EdgeDirection, Error, IncrementalLayoutSettings, RectangularBoundary};

#[test]
fn settings_load_from_camel_case_json_with_defaults() {
    let json = r#"{
        "initialStepSize": 0.5,
        "maxForce": 250.0,
        "idealEdgeLength": { "direction": "south", "separation": 12.5 },
        "overlapRemoval": { "allowDeferToVertical": false },
        "maxConstraintLevel": 1
    }"#;
    let s: IncrementalLayoutSettings = serde_json::from_str(json).unwrap();
    assert_eq!(s.initial_step_size, 0.5);
    assert_eq!(s.max_force, 250.0);
    assert_eq!(s.ideal_edge_length.direction, EdgeDirection::South);
    assert_eq!(s.ideal_edge_length.separation, 12.5);
    assert_eq!(
        s.ideal_edge_length.length,
        IncrementalLayoutSettings::default().ideal_edge_length.length
    );
    assert!(!s.overlap_removal.allow_defer_to_vertical);
    assert!(!s.overlap_removal.consider_proportional_overlap);
    assert_eq!(s.max_constraint_level, 1);
    assert_eq!(s.decay, 0.9);
    s.validate().unwrap();
}

#[test]
fn loaded_settings_are_still_validated() {
    let s: IncrementalLayoutSettings = serde_json::from_str(r#"{ "friction": 2.0 }"#).unwrap();
    let err = s.validate().unwrap_err();
    assert!(matches!(err, Error::InvalidSetting { name: "friction", .. }));
    assert_eq!(
        err.to_string(),
        "invalid setting `friction` = 2: expected a value in [0, 1]"
    );
}

#[test]
fn settings_round_trip_through_json() {
    let s = IncrementalLayoutSettings {
        runge_kutta_integration: true,
        node_separation: 4.0,
        ..Default::default()
    };
    let json = serde_json::to_string(&s).unwrap();
    assert!(json.contains("\"rungeKuttaIntegration\":true"));
    let back: IncrementalLayoutSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);
}

#[test]
fn boundaries_load_with_per_side_borders() {
    let json = r#"{
        "left": { "margin": 3.0, "fixedPosition": 10.0 },
        "minWidth": 50.0
    }"#;
    let b: RectangularBoundary = serde_json::from_str(json).unwrap();
    assert_eq!(b.left.margin, 3.0);
    assert!(b.left.is_fixed());
    assert!(!b.right.is_fixed());
    assert_eq!(b.min_width, 50.0);
    assert!(b.generate_fixed_constraints);
}
