use chrono::NaiveDate;
use olap_model::{HierarchyId, LevelId, MemberKind, ModelError, Schema, Value};
use pretty_assertions::assert_eq;

fn time_schema() -> (Schema, HierarchyId, LevelId, LevelId) {
    let mut schema = Schema::new("Sales");
    let time = schema.add_dimension("Time").unwrap();
    let hierarchy = schema.add_hierarchy(time, None, true).unwrap();
    let year = schema.add_level(hierarchy, "Year").unwrap();
    let quarter = schema.add_level(hierarchy, "Quarter").unwrap();
    (schema, hierarchy, year, quarter)
}

#[test]
fn all_member_roots_the_hierarchy() {
    let (mut schema, hierarchy, year, quarter) = time_schema();
    let y1997 = schema.add_member(year, None, "1997").unwrap();
    let q1 = schema.add_member(quarter, Some(y1997), "Q1").unwrap();

    let all = schema.default_member(hierarchy);
    assert_eq!(schema.member(all).name(), "All Times");
    assert_eq!(schema.member(all).kind(), MemberKind::All);
    assert_eq!(schema.member(y1997).parent(), Some(all));
    assert_eq!(schema.member(all).children(), &[y1997]);
    assert_eq!(schema.member(q1).unique_name(), "[Time].[1997].[Q1]");
    assert_eq!(schema.hierarchy(hierarchy).unique_name(), "[Time]");
    assert_eq!(schema.level(quarter).unique_name(), "[Time].[Quarter]");
    assert_eq!(schema.level(quarter).depth(), 2);
}

#[test]
fn every_hierarchy_has_a_null_member() {
    let (schema, hierarchy, _, _) = time_schema();
    let null = schema.hierarchy(hierarchy).null_member();
    assert!(schema.member(null).is_null());
    assert_eq!(schema.member(null).hierarchy(), hierarchy);
    assert_eq!(schema.member(null).level(), None);
}

#[test]
fn measures_default_to_the_first_measure() {
    let mut schema = Schema::new("Sales");
    let level = schema.add_measures_dimension().unwrap();
    let sales = schema.add_member(level, None, "Sales").unwrap();
    schema.add_member(level, None, "Cost").unwrap();

    let hierarchy = schema.member(sales).hierarchy();
    assert!(!schema.hierarchy(hierarchy).has_all());
    assert_eq!(schema.default_member(hierarchy), sales);
    assert_eq!(schema.member(sales).unique_name(), "[Measures].[Sales]");
}

#[test]
fn empty_hierarchy_without_all_defaults_to_null() {
    let mut schema = Schema::new("Sales");
    let dim = schema.add_dimension("Scenario").unwrap();
    let hierarchy = schema.add_hierarchy(dim, None, false).unwrap();
    let default = schema.default_member(hierarchy);
    assert_eq!(default, schema.hierarchy(hierarchy).null_member());
}

#[test]
fn explicit_default_member_wins() {
    let (mut schema, hierarchy, year, _) = time_schema();
    schema.add_member(year, None, "1997").unwrap();
    let y1998 = schema.add_member(year, None, "1998").unwrap();
    schema.set_default_member(hierarchy, y1998).unwrap();
    assert_eq!(schema.default_member(hierarchy), y1998);
}

#[test]
fn default_member_must_belong_to_the_hierarchy() {
    let (mut schema, hierarchy, _, _) = time_schema();
    let store = schema.add_dimension("Store").unwrap();
    let stores = schema.add_hierarchy(store, None, true).unwrap();
    let all_stores = schema.default_member(stores);

    let err = schema.set_default_member(hierarchy, all_stores).unwrap_err();
    assert_eq!(
        err,
        ModelError::ForeignMember {
            member: "[Store].[All Stores]".to_string(),
            hierarchy: "[Time]".to_string(),
        }
    );
}

#[test]
fn duplicates_are_rejected_case_insensitively() {
    let (mut schema, hierarchy, year, _) = time_schema();
    assert_eq!(
        schema.add_dimension("TIME").unwrap_err(),
        ModelError::DuplicateDimension("TIME".to_string())
    );
    assert!(matches!(
        schema.add_level(hierarchy, "year").unwrap_err(),
        ModelError::DuplicateLevel { .. }
    ));

    schema.add_member(year, None, "1997").unwrap();
    assert_eq!(
        schema.add_member(year, None, "1997").unwrap_err(),
        ModelError::DuplicateMember("[Time].[1997]".to_string())
    );

    let dim = schema.lookup_dimension("time").unwrap();
    assert!(matches!(
        schema.add_hierarchy(dim, Some("Time"), false).unwrap_err(),
        ModelError::DuplicateHierarchy { .. }
    ));
}

#[test]
fn parents_must_come_from_the_level_above() {
    let (mut schema, _, year, quarter) = time_schema();
    let y1997 = schema.add_member(year, None, "1997").unwrap();

    assert!(matches!(
        schema.add_member(quarter, None, "Q1").unwrap_err(),
        ModelError::InvalidParent { .. }
    ));
    let q1 = schema.add_member(quarter, Some(y1997), "Q1").unwrap();
    assert!(matches!(
        schema.add_member(quarter, Some(q1), "Q2").unwrap_err(),
        ModelError::InvalidParent { .. }
    ));
}

#[test]
fn secondary_hierarchies_are_qualified_by_their_dimension() {
    let mut schema = Schema::new("Sales");
    let store = schema.add_dimension("Store").unwrap();
    let main = schema.add_hierarchy(store, None, true).unwrap();
    let by_type = schema.add_hierarchy(store, Some("Store Type"), true).unwrap();

    assert_eq!(schema.hierarchy(main).unique_name(), "[Store]");
    assert_eq!(schema.hierarchy(by_type).unique_name(), "[Store].[Store Type]");
    assert_eq!(schema.dimension(store).hierarchies(), &[main, by_type]);
    assert_eq!(schema.dimension(store).default_hierarchy(), Some(main));
}

#[test]
fn members_are_found_by_unique_name() {
    let (mut schema, _, year, quarter) = time_schema();
    let y1997 = schema.add_member(year, None, "1997").unwrap();
    let q2 = schema.add_member(quarter, Some(y1997), "Q2").unwrap();

    assert_eq!(schema.lookup_member("[Time].[1997].[Q2]"), Some(q2));
    assert_eq!(schema.lookup_member("[time].[1997].[q2]"), Some(q2));
    assert_eq!(schema.lookup_member("[Time].[1998]"), None);
    assert_eq!(schema.member(q2).ordinal(), 0);
}

#[test]
fn values_use_a_tagged_json_layout() {
    let value = Value::Double(1.5);
    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(json, r#"{"type":"double","value":1.5}"#);
    assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);

    assert_eq!(serde_json::to_string(&Value::Null).unwrap(), r#"{"type":"null"}"#);

    let at = NaiveDate::from_ymd_opt(1997, 3, 31)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let value = Value::DateTime(at);
    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);
    assert_eq!(value.to_string(), "1997-03-31T00:00:00");
}

#[test]
fn numeric_view_of_values() {
    assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
    assert_eq!(Value::String("3".to_string()).as_f64(), None);
    assert!(Value::Double(0.0).is_numeric());
    assert!(Value::default().is_null());
    assert_eq!(Value::String("x".to_string()).type_name(), "string");
}
