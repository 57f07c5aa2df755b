//! Integration tests for the full persistence pipeline.
//!
//! Tests: Resource → Session → TripleBuilder → TripleStore → Query → Mapper
//!
//! Verifies:
//! - Lifecycle state transitions across save, bring and delete
//! - Store round trips (count and order) for each operation
//! - Uniqueness, identity and enum guards
//! - Collection scoping, language partitioning and predicate equivalence
//! - Instance cache short-circuit and rebuild under concurrency

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use triplebind_core::term::vocab;
    use triplebind_core::{
        AttributeDef, AttributeValue, EquivalentPredicates, Iri, Language, Literal, MapperError, NameWith,
        Resource, ResourceClass, Rule, Schema, StoreError, Term, Triple, Value,
    };

    use crate::config::MapperConfig;
    use crate::session::{BringSpec, DeleteOptions, SaveOptions, Session};
    use crate::store::{InMemoryTripleStore, StoreCall, StoreOp, TripleStore};

    const ORG: &str = "http://ex/Organization";
    const DESCRIPTION: &str = "http://ex/description";
    const DC_DESCRIPTION: &str = "http://purl.org/dc/terms/description";

    fn status_values() -> Vec<String> {
        (0..8).map(|i| format!("s{i}")).collect()
    }

    fn test_schema() -> Arc<Schema> {
        let mut schema = Schema::new();
        schema.register(
            ResourceClass::builder("Person", Iri::new("http://ex/Person"))
                .attribute(AttributeDef::new("name", Iri::new("http://ex/name")))
                .attribute(AttributeDef::new("email", Iri::new("http://ex/email")))
                .build()
                .unwrap(),
        );
        schema.register(
            ResourceClass::builder("Organization", Iri::new(ORG))
                .attribute(AttributeDef::new("name", Iri::new("http://ex/name")).rule(Rule::Existence))
                .attribute(AttributeDef::new("description", Iri::new(DESCRIPTION)))
                .attribute(AttributeDef::new("tags", Iri::new("http://ex/tag")).list())
                .attribute(AttributeDef::new("founder", Iri::new("http://ex/founder")).range_class("Person"))
                .attribute(AttributeDef::computed("display", |r: &Resource| {
                    r.value("name")
                        .map(|v| AttributeValue::from(format!("Org: {}", v.to_plain_string())))
                }))
                .name_with(NameWith::attribute("name"))
                .build()
                .unwrap(),
        );
        schema.register(
            ResourceClass::builder("Status", Iri::new("http://ex/Status"))
                .attribute(AttributeDef::new("code", Iri::new("http://ex/code")))
                .name_with(NameWith::attribute("code"))
                .enumeration(status_values())
                .build()
                .unwrap(),
        );
        schema.register(
            ResourceClass::builder("Place", Iri::new("http://ex/Place"))
                .attribute(AttributeDef::new("label", Iri::new("http://ex/label")))
                .attribute(AttributeDef::new("address", Iri::new("http://ex/address")))
                .build()
                .unwrap(),
        );
        schema.register(
            ResourceClass::builder("Ontology", Iri::new("http://ex/Ontology"))
                .attribute(AttributeDef::new("acronym", Iri::new("http://ex/acronym")))
                .name_with(NameWith::attribute("acronym"))
                .build()
                .unwrap(),
        );
        schema.register(
            ResourceClass::builder("Concept", Iri::new("http://ex/Concept"))
                .attribute(AttributeDef::new("ontology", Iri::new("http://ex/ontology")).range_class("Ontology"))
                .attribute(AttributeDef::collection_scoped(
                    "prefLabel",
                    "#prefLabel",
                    Iri::new("http://www.w3.org/2004/02/skos/core#prefLabel"),
                ))
                .attribute(AttributeDef::new("synonyms", Iri::new("http://ex/synonym")).list())
                .collection("ontology")
                .name_with(NameWith::custom(|r: &Resource| {
                    let graph = r.collection().map_err(|e| e.to_string())?;
                    let label = r
                        .value("prefLabel")
                        .and_then(Value::as_str)
                        .ok_or("prefLabel is required")?;
                    Ok(graph.join(&format!("/concepts/{label}")))
                }))
                .build()
                .unwrap(),
        );
        Arc::new(schema)
    }

    fn setup() -> (Session<Arc<InMemoryTripleStore>>, Arc<InMemoryTripleStore>) {
        triplebind_observability::init();
        let store = Arc::new(InMemoryTripleStore::new());
        let session = Session::new(store.clone(), test_schema());
        (session, store)
    }

    fn acme(session: &Session<Arc<InMemoryTripleStore>>) -> Resource {
        session
            .create(
                "Organization",
                [
                    ("name", AttributeValue::from("Acme")),
                    ("description", AttributeValue::from("Widgets")),
                ],
            )
            .unwrap()
    }

    fn acme_id() -> Iri {
        Iri::new("http://ex/Organization/Acme")
    }

    fn ops(store: &InMemoryTripleStore) -> Vec<StoreOp> {
        store.calls().unwrap().iter().map(StoreCall::op).collect()
    }

    #[test]
    fn configured_vocabulary_drives_class_and_predicate_iris() {
        let config = MapperConfig::from_json(
            r#"{"base_iri": "http://data.ex/", "prefixes": {"foaf": "http://xmlns.com/foaf/0.1/"}}"#,
        )
        .unwrap();
        let mut schema = Schema::new();
        schema.register(
            config
                .class("Agent", "Agent")
                .attribute(config.attribute("name", "foaf:name").unwrap())
                .attribute(config.attribute("homepage", "http://xmlns.com/foaf/0.1/homepage").unwrap())
                .name_with(NameWith::attribute("name"))
                .build()
                .unwrap(),
        );
        let store = Arc::new(InMemoryTripleStore::new());
        let session = Session::new(store.clone(), Arc::new(schema));

        let mut agent = session.create("Agent", [("name", AttributeValue::from("Ada Lovelace"))]).unwrap();
        session.save(&mut agent).unwrap();

        let id = Iri::new("http://data.ex/Agent/Ada+Lovelace");
        assert_eq!(agent.peek_id(), Some(&id));
        assert!(store
            .contains(
                &config.iri("Agent"),
                &Triple::new(id.clone(), Iri::new("http://xmlns.com/foaf/0.1/name"), Literal::string("Ada Lovelace"))
            )
            .unwrap());

        let found = session.find("Agent", id).unwrap().include(["name"]).first().unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&AttributeValue::from("Ada Lovelace")));
    }

    #[test]
    fn construction_tracks_supplied_attributes_only() {
        let (session, store) = setup();
        let r = session
            .create(
                "Organization",
                [
                    ("name", AttributeValue::from("Acme")),
                    ("in", AttributeValue::from("ignored")),
                    ("tags", AttributeValue::list(["a"])),
                ],
            )
            .unwrap();

        assert!(!r.is_persistent());
        let modified: Vec<&str> = r.modified_attributes().iter().map(String::as_str).collect();
        assert_eq!(modified, vec!["name", "tags"]);
        assert!(!r.should_bring("description"));
        assert_eq!(store.call_count().unwrap(), 0);
    }

    #[test]
    fn unique_resource_validates_and_saves() {
        let (session, store) = setup();
        let mut r = acme(&session);

        assert!(session.validate(&mut r).unwrap());
        session.save(&mut r).unwrap();

        assert!(r.is_persistent());
        assert!(!r.is_modified());
        assert!(r.is_fully_loaded());
        assert_eq!(r.peek_id(), Some(&acme_id()));
        assert!(store
            .contains(
                &Iri::new(ORG),
                &Triple::new(acme_id(), Iri::new(vocab::RDF_TYPE), Iri::new(ORG))
            )
            .unwrap());
        assert!(store
            .contains(
                &Iri::new(ORG),
                &Triple::new(acme_id(), Iri::new(DESCRIPTION), Literal::string("Widgets"))
            )
            .unwrap());
    }

    #[test]
    fn validate_is_idempotent_and_side_effect_free() {
        let (session, store) = setup();
        let mut r = session
            .create("Organization", [("description", AttributeValue::from("nameless"))])
            .unwrap();

        assert!(!session.validate(&mut r).unwrap());
        let first = r.errors().clone();
        assert!(!session.validate(&mut r).unwrap());
        assert_eq!(r.errors(), &first);

        assert!(first.get("name").unwrap().contains_key("existence"));
        assert!(r.peek_id().is_none());
        assert_eq!(store.count_of(StoreOp::Insert).unwrap(), 0);
        assert_eq!(store.count_of(StoreOp::Delete).unwrap(), 0);
    }

    #[test]
    fn invalid_save_fails_without_store_calls() {
        let (session, store) = setup();
        let mut r = session
            .create("Organization", [("description", AttributeValue::from("nameless"))])
            .unwrap();

        let err = session.save(&mut r).unwrap_err();
        match err {
            MapperError::Validation(errors) => assert!(errors.contains_key("name")),
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(store.call_count().unwrap(), 0);
        assert!(!r.is_persistent());
    }

    #[test]
    fn unmodified_persistent_save_is_a_no_op() {
        let (session, store) = setup();
        let mut r = acme(&session);
        session.save(&mut r).unwrap();
        store.clear_calls().unwrap();

        session.save(&mut r).unwrap();

        assert_eq!(store.call_count().unwrap(), 0);
        assert!(r.is_persistent());
    }

    #[test]
    fn duplicate_identity_is_reported_on_naming_attribute() {
        let (session, _store) = setup();
        let mut first = acme(&session);
        session.save(&mut first).unwrap();

        let mut second = acme(&session);
        assert!(!session.validate(&mut second).unwrap());
        let errors = second.errors().get("name").unwrap();
        assert!(errors["duplicate"].contains("http://ex/Organization/Acme"));

        let err = session.save(&mut second).unwrap_err();
        assert!(matches!(err, MapperError::Validation(_)));
    }

    #[test]
    fn direct_id_strategy_requires_an_assigned_id() {
        let (session, store) = setup();
        let mut r = session
            .create("Person", [("name", AttributeValue::from("Ada"))])
            .unwrap();

        assert!(matches!(r.id(), Err(MapperError::IdGeneration(_))));
        assert!(!session.validate(&mut r).unwrap());
        assert_eq!(
            r.errors().get("id").unwrap()["existence"],
            ":id must be set if configured in name_with"
        );
        assert_eq!(store.count_of(StoreOp::Exists).unwrap(), 0);

        r.set_id(Iri::new("http://ex/people/ada")).unwrap();
        session.save(&mut r).unwrap();
        let err = r.set_id(Iri::new("http://ex/people/other")).unwrap_err();
        assert!(matches!(err, MapperError::IllegalMutation(_)));
    }

    #[test]
    fn id_is_generated_once_per_instance() {
        let (session, _store) = setup();
        let mut r = acme(&session);
        let first = r.id().unwrap().clone();
        r.set("name", "Renamed").unwrap();
        assert_eq!(r.id().unwrap(), &first);
    }

    #[test]
    fn bring_issues_exactly_one_scoped_load() {
        let (session, store) = setup();
        let mut saved = acme(&session);
        session.save(&mut saved).unwrap();

        let mut r = session.find("Organization", acme_id()).unwrap().first().unwrap().unwrap();
        assert!(r.should_bring("description"));
        assert!(!r.loaded_attributes().contains("description"));
        store.clear_calls().unwrap();

        session.bring(&mut r, &["description".into()]).unwrap();

        let calls = store.calls().unwrap();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            StoreCall::Load { graph, ids, predicates } => {
                assert_eq!(graph, &Iri::new(ORG));
                assert_eq!(ids, &vec![acme_id()]);
                assert_eq!(predicates, &Some(vec![Iri::new(DESCRIPTION)]));
            }
            other => panic!("expected a load, got {other:?}"),
        }
        assert!(r.loaded_attributes().contains("description"));
        assert_eq!(r.get("description"), Some(&AttributeValue::from("Widgets")));
        assert!(!r.is_modified());
    }

    #[test]
    fn bring_rejects_computed_attributes() {
        let (session, _store) = setup();
        let mut saved = acme(&session);
        session.save(&mut saved).unwrap();

        let err = session.bring(&mut saved, &["display".into()]).unwrap_err();
        assert!(matches!(err, MapperError::IllegalMutation(_)));
        assert_eq!(
            saved.compute("display").unwrap(),
            Some(AttributeValue::from("Org: Acme"))
        );
    }

    #[test]
    fn bring_remaining_batches_every_safe_attribute() {
        let (session, store) = setup();
        let mut saved = acme(&session);
        session.save(&mut saved).unwrap();

        let mut r = session.find("Organization", acme_id()).unwrap().first().unwrap().unwrap();
        r.set("tags", AttributeValue::list(["local"])).unwrap();
        store.clear_calls().unwrap();

        session.bring_remaining(&mut r).unwrap();

        assert_eq!(ops(&store), vec![StoreOp::Load]);
        assert_eq!(r.get("name"), Some(&AttributeValue::from("Acme")));
        assert_eq!(r.get("tags"), Some(&AttributeValue::list(["local"])));
        assert!(r.modified_attributes().contains("tags"));
        assert!(r.remaining_to_bring().is_empty());
    }

    #[test]
    fn nested_bring_loads_referenced_resources() {
        let (session, _store) = setup();
        let mut ada = session.create("Person", [("name", AttributeValue::from("Ada"))]).unwrap();
        ada.set_id(Iri::new("http://ex/people/ada")).unwrap();
        session.save(&mut ada).unwrap();

        let mut org = acme(&session);
        org.set("founder", ada.clone()).unwrap();
        session.save(&mut org).unwrap();

        let mut r = session.find("Organization", acme_id()).unwrap().first().unwrap().unwrap();
        session
            .bring(&mut r, &[BringSpec::nested("founder", ["name"])])
            .unwrap();

        let founder = r.value("founder").and_then(Value::as_resource).unwrap();
        assert_eq!(founder.peek_id(), Some(&Iri::new("http://ex/people/ada")));
        assert_eq!(founder.get("name"), Some(&AttributeValue::from("Ada")));
        assert!(!founder.loaded_attributes().contains("email"));
    }

    #[test]
    fn update_deletes_previous_values_before_inserting() {
        let (session, store) = setup();
        let mut r = acme(&session);
        session.save(&mut r).unwrap();
        store.clear_calls().unwrap();

        r.set("description", "Gadgets").unwrap();
        session.save(&mut r).unwrap();

        assert_eq!(ops(&store), vec![StoreOp::Delete, StoreOp::Insert]);
        let graph = Iri::new(ORG);
        assert!(!store
            .contains(&graph, &Triple::new(acme_id(), Iri::new(DESCRIPTION), Literal::string("Widgets")))
            .unwrap());
        assert!(store
            .contains(&graph, &Triple::new(acme_id(), Iri::new(DESCRIPTION), Literal::string("Gadgets")))
            .unwrap());
        assert!(r.previous_values().is_none());
    }

    #[test]
    fn updating_an_unloaded_attribute_replaces_the_stored_value() {
        let (session, store) = setup();
        let graph = Iri::new("http://ex/Place");
        let place = Iri::new("http://ex/places/2");
        let label = Iri::new("http://ex/label");
        let mut original = session.create("Place", [("label", AttributeValue::from("Old"))]).unwrap();
        original.set_id(place.clone()).unwrap();
        session.save(&mut original).unwrap();

        let mut stub = session.find("Place", place.clone()).unwrap().first().unwrap().unwrap();
        assert!(stub.loaded_attributes().is_empty());
        stub.set("label", "New").unwrap();
        store.clear_calls().unwrap();

        session.save(&mut stub).unwrap();

        assert_eq!(ops(&store), vec![StoreOp::Load, StoreOp::Delete, StoreOp::Insert]);
        let labels: Vec<Term> = store
            .triples(&graph)
            .unwrap()
            .into_iter()
            .filter(|t| t.predicate == label)
            .map(|t| t.object)
            .collect();
        assert_eq!(labels, vec![Term::from(Literal::string("New"))]);

        let reloaded = session.find("Place", place).unwrap().include(["label"]).first().unwrap().unwrap();
        assert_eq!(reloaded.get("label"), Some(&AttributeValue::from("New")));
    }

    #[test]
    fn failed_delete_phase_skips_insert_and_propagates() {
        let (session, store) = setup();
        let mut r = acme(&session);
        session.save(&mut r).unwrap();
        r.set("description", "Gadgets").unwrap();
        store.clear_calls().unwrap();
        store
            .fail_next(StoreOp::Delete, StoreError::Update("store unavailable".into()))
            .unwrap();

        let err = session.save(&mut r).unwrap_err();

        assert_eq!(err, MapperError::Store(StoreError::Update("store unavailable".into())));
        assert_eq!(ops(&store), vec![StoreOp::Delete]);
        assert!(r.is_modified());
        assert!(r.modified_attributes().contains("description"));
    }

    #[test]
    fn store_failure_during_probe_propagates() {
        let (session, store) = setup();
        store
            .fail_next(StoreOp::Exists, StoreError::Transport("connection reset".into()))
            .unwrap();
        let mut r = acme(&session);

        let err = session.validate(&mut r).unwrap_err();
        assert!(matches!(err, MapperError::Store(StoreError::Transport(_))));
    }

    #[test]
    fn batched_save_writes_lines_without_store_calls() {
        let (session, store) = setup();
        let mut r = acme(&session);
        let mut sink: Vec<u8> = Vec::new();

        session.save_batch(&mut r, &mut sink, SaveOptions::default()).unwrap();

        let text = String::from_utf8(sink).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.ends_with("<http://ex/Organization> .")));
        assert!(lines.contains(
            &"<http://ex/Organization/Acme> <http://ex/name> \"Acme\" <http://ex/Organization> ."
        ));
        assert_eq!(store.call_count().unwrap(), 0);
        assert!(r.is_persistent());
        assert!(!r.is_modified());
    }

    #[test]
    fn delete_requires_persistence() {
        let (session, store) = setup();
        let mut r = acme(&session);
        let err = session.delete(&mut r).unwrap_err();
        assert!(matches!(err, MapperError::IllegalMutation(_)));
        assert_eq!(store.call_count().unwrap(), 0);
    }

    #[test]
    fn delete_reloads_missing_attributes_and_nested_structures() {
        let (session, store) = setup();
        let graph = Iri::new("http://ex/Place");
        let place = Iri::new("http://ex/places/1");
        store
            .seed(
                &graph,
                vec![
                    Triple::new(place.clone(), Iri::new(vocab::RDF_TYPE), Iri::new("http://ex/Place")),
                    Triple::new(place.clone(), Iri::new("http://ex/label"), Literal::string("HQ")),
                    Triple::new(place.clone(), Iri::new("http://ex/address"), Term::Blank("addr".into())),
                    Triple::new(Term::Blank("addr".into()), Iri::new("http://ex/city"), Literal::string("Paris")),
                ],
            )
            .unwrap();

        let mut r = session.find("Place", place.clone()).unwrap().first().unwrap().unwrap();
        assert!(!r.is_fully_loaded());
        store.clear_calls().unwrap();

        session.delete(&mut r).unwrap();

        assert_eq!(ops(&store), vec![StoreOp::Load, StoreOp::DeleteNested, StoreOp::Delete]);
        assert!(store.triples(&graph).unwrap().is_empty());
        assert!(!r.is_persistent());
        assert_eq!(r.get("label"), Some(&AttributeValue::from("HQ")));
    }

    #[test]
    fn deleted_resource_can_be_saved_again() {
        let (session, store) = setup();
        let mut r = acme(&session);
        session.save(&mut r).unwrap();
        session.delete(&mut r).unwrap();
        assert!(!store.exists(&session.schema().class("Organization").unwrap(), &acme_id()).unwrap());

        r.set("description", "Back again").unwrap();
        session.save(&mut r).unwrap();
        assert!(session.exists(&mut r).unwrap());
    }

    #[test]
    fn enum_instances_are_guarded() {
        let (session, store) = setup();
        let mut r = session.create("Status", [("code", AttributeValue::from("s0"))]).unwrap();

        let err = session.save(&mut r).unwrap_err();
        assert!(matches!(err, MapperError::IllegalMutation(_)));
        assert_eq!(store.call_count().unwrap(), 0);

        session.save_with(&mut r, SaveOptions { init_enum: true }).unwrap();
        let err = session.delete(&mut r).unwrap_err();
        assert!(matches!(err, MapperError::IllegalMutation(_)));
        assert!(r.is_persistent());

        session.delete_with(&mut r, DeleteOptions { init_enum: true }).unwrap();
        assert!(!r.is_persistent());
    }

    #[test]
    fn enum_save_rebuilds_cache_and_find_skips_the_store() {
        let (session, store) = setup();
        let created = session.initialize_enum("Status").unwrap();
        assert_eq!(created.len(), status_values().len());
        assert!(session.initialize_enum("Status").unwrap().is_empty());
        store.clear_calls().unwrap();

        let hit = session
            .find("Status", Iri::new("http://ex/Status/s3"))
            .unwrap()
            .first()
            .unwrap()
            .unwrap();
        assert_eq!(hit.get("code"), Some(&AttributeValue::from("s3")));
        assert!(hit.is_fully_loaded());

        let miss = session
            .find("Status", Iri::new("http://ex/Status/unknown"))
            .unwrap()
            .all()
            .unwrap();
        assert!(miss.is_empty());
        assert_eq!(store.call_count().unwrap(), 0);
    }

    #[test]
    fn failed_cache_rebuild_still_reports_a_committed_save() {
        let (session, store) = setup();
        let mut r = session.create("Status", [("code", AttributeValue::from("s1"))]).unwrap();
        store
            .fail_next(StoreOp::Subjects, StoreError::Query("timeout".into()))
            .unwrap();

        let err = session.save_with(&mut r, SaveOptions { init_enum: true }).unwrap_err();

        assert_eq!(err, MapperError::Store(StoreError::Query("timeout".into())));
        assert!(r.is_persistent());
        assert!(!r.is_modified());
        assert!(store
            .contains(
                &Iri::new("http://ex/Status"),
                &Triple::new(
                    Iri::new("http://ex/Status/s1"),
                    Iri::new(vocab::RDF_TYPE),
                    Iri::new("http://ex/Status")
                )
            )
            .unwrap());
        assert_eq!(ops(&store), vec![StoreOp::Exists, StoreOp::Insert, StoreOp::Subjects]);
    }

    #[test]
    fn concurrent_enum_saves_leave_a_complete_cache() {
        let (session, store) = setup();
        let values = status_values();

        std::thread::scope(|scope| {
            for chunk in values.chunks(2) {
                let session = &session;
                scope.spawn(move || {
                    for code in chunk {
                        let mut r = session
                            .create("Status", [("code", AttributeValue::from(code.as_str()))])
                            .unwrap();
                        session.save_with(&mut r, SaveOptions { init_enum: true }).unwrap();
                    }
                });
            }
        });

        store.clear_calls().unwrap();
        for code in &values {
            let found = session
                .find("Status", Iri::new(format!("http://ex/Status/{code}")))
                .unwrap()
                .first()
                .unwrap();
            assert!(found.is_some(), "{code} missing from cache");
        }
        assert_eq!(store.call_count().unwrap(), 0);
    }

    #[test]
    fn absent_attributes_map_to_defaults_on_load() {
        let (session, _store) = setup();
        let mut r = session.create("Organization", [("name", AttributeValue::from("Sparse"))]).unwrap();
        session.save(&mut r).unwrap();

        let loaded = session
            .find("Organization", Iri::new("http://ex/Organization/Sparse"))
            .unwrap()
            .include_all()
            .first()
            .unwrap()
            .unwrap();

        assert_eq!(loaded.get("tags"), Some(&AttributeValue::List(vec![])));
        assert_eq!(loaded.get("description"), None);
        assert!(loaded.is_fully_loaded());
        assert!(!loaded.is_modified());
    }

    #[test]
    fn where_filters_and_projections() {
        let (session, _store) = setup();
        for (name, tag) in [("Acme", "tools"), ("Globex", "energy"), ("Initech", "tools")] {
            let mut r = session
                .create(
                    "Organization",
                    [("name", AttributeValue::from(name)), ("tags", AttributeValue::list([tag]))],
                )
                .unwrap();
            session.save(&mut r).unwrap();
        }

        let query = session
            .where_("Organization", [("tags", AttributeValue::from("tools"))])
            .unwrap()
            .include(["name"]);
        let names: Vec<String> = query
            .all()
            .unwrap()
            .iter()
            .filter_map(|r| r.value("name").map(Value::to_plain_string))
            .collect();
        assert_eq!(names, vec!["Acme".to_string(), "Initech".to_string()]);

        // Restartable: the same cursor runs again.
        assert_eq!(query.all().unwrap().len(), 2);

        let projections = session.all("Organization").unwrap().include(["tags"]).projections().unwrap();
        assert_eq!(projections.len(), 3);
        assert!(projections.iter().all(|p| p.values().contains_key("tags")));
        assert!(projections.iter().all(|p| !p.values().contains_key("name")));
    }

    #[test]
    fn unknown_filter_attribute_is_a_configuration_error() {
        let (session, _store) = setup();
        let err = session
            .where_("Organization", [("colour", AttributeValue::from("red"))])
            .unwrap()
            .all()
            .unwrap_err();
        assert!(matches!(err, MapperError::Configuration(_)));
    }

    #[test]
    fn collection_scoped_classes_live_in_their_collection_graph() {
        let (session, store) = setup();
        let mut go = session.create("Ontology", [("acronym", AttributeValue::from("GO"))]).unwrap();
        session.save(&mut go).unwrap();
        let go_id = go.peek_id().cloned().unwrap();

        let mut concept = session
            .create(
                "Concept",
                [
                    ("ontology", AttributeValue::from(go.clone())),
                    ("prefLabel", AttributeValue::from("cell")),
                ],
            )
            .unwrap();
        session.save(&mut concept).unwrap();

        let concept_id = Iri::new("http://ex/Ontology/GO/concepts/cell");
        assert_eq!(concept.peek_id(), Some(&concept_id));
        assert!(store
            .contains(
                &go_id,
                &Triple::new(concept_id.clone(), go_id.join("#prefLabel"), Literal::string("cell"))
            )
            .unwrap());

        let err = session.all("Concept").unwrap().all().unwrap_err();
        assert!(matches!(err, MapperError::Configuration(_)));

        let found = session
            .all("Concept")
            .unwrap()
            .in_collection(go_id.clone())
            .include_all()
            .all()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("prefLabel"), Some(&AttributeValue::from("cell")));
        assert_eq!(found[0].collection().unwrap(), go_id);
        let ontology = found[0].value("ontology").and_then(Value::as_resource).unwrap();
        assert_eq!(ontology.class().name(), "Ontology");
    }

    #[test]
    fn multi_valued_collection_is_a_configuration_error() {
        let (session, _store) = setup();
        let mut concept = session
            .create(
                "Concept",
                [
                    (
                        "ontology",
                        AttributeValue::List(vec![
                            Value::Iri(Iri::new("http://ex/Ontology/A")),
                            Value::Iri(Iri::new("http://ex/Ontology/B")),
                        ]),
                    ),
                    ("prefLabel", AttributeValue::from("cell")),
                ],
            )
            .unwrap();
        concept.set_id(Iri::new("http://ex/concepts/1")).unwrap();

        let err = session.save_batch(&mut concept, &mut Vec::new(), SaveOptions::default()).unwrap_err();
        assert!(matches!(err, MapperError::Configuration(_)));
    }

    #[test]
    fn language_tagged_values_are_partitioned_on_request() {
        let (session, store) = setup();
        let graph = Iri::new(ORG);
        let id = Iri::new("http://ex/Organization/Multi");
        store
            .seed(
                &graph,
                vec![
                    Triple::new(id.clone(), Iri::new(vocab::RDF_TYPE), Iri::new(ORG)),
                    Triple::new(id.clone(), Iri::new("http://ex/tag"), Literal::lang("outils", "fr")),
                    Triple::new(id.clone(), Iri::new("http://ex/tag"), Literal::lang("tools", "en")),
                    Triple::new(id.clone(), Iri::new("http://ex/tag"), Iri::new("http://ex/concepts/tool")),
                ],
            )
            .unwrap();

        let r = session
            .find("Organization", id.clone())
            .unwrap()
            .include(["tags"])
            .include_languages()
            .first()
            .unwrap()
            .unwrap();

        match r.get("tags").unwrap() {
            AttributeValue::ByLanguage(by_lang) => {
                assert_eq!(by_lang[&Language::tag("fr")], vec![Value::from("outils")]);
                assert_eq!(by_lang[&Language::tag("en")], vec![Value::from("tools")]);
                assert_eq!(by_lang[&Language::None], vec![Value::Iri(Iri::new("http://ex/concepts/tool"))]);
            }
            other => panic!("expected language partition, got {other:?}"),
        }
        assert!(!r.is_modified());
    }

    #[test]
    fn equivalent_predicates_fill_attributes_on_load() {
        let store = Arc::new(InMemoryTripleStore::new());
        let mut equivalents = EquivalentPredicates::new();
        equivalents.insert(Iri::new(DESCRIPTION), vec![Iri::new(DC_DESCRIPTION)]);
        let session = Session::new(store.clone(), test_schema()).with_equivalent_predicates(equivalents);

        let graph = Iri::new(ORG);
        let id = Iri::new("http://ex/Organization/Legacy");
        store
            .seed(
                &graph,
                vec![
                    Triple::new(id.clone(), Iri::new(vocab::RDF_TYPE), Iri::new(ORG)),
                    Triple::new(id.clone(), Iri::new(DC_DESCRIPTION), Literal::string("From Dublin Core")),
                ],
            )
            .unwrap();

        let r = session
            .find("Organization", id)
            .unwrap()
            .include(["description"])
            .first()
            .unwrap()
            .unwrap();
        assert_eq!(r.get("description"), Some(&AttributeValue::from("From Dublin Core")));

        match store.calls().unwrap().last() {
            Some(StoreCall::Load { predicates: Some(p), .. }) => {
                assert_eq!(p, &vec![Iri::new(DESCRIPTION), Iri::new(DC_DESCRIPTION)]);
            }
            other => panic!("expected a load, got {other:?}"),
        }
    }

    #[test]
    fn attribute_map_includes_residual_unmapped_data() {
        let (session, store) = setup();
        let graph = Iri::new(ORG);
        let id = Iri::new("http://ex/Organization/Wide");
        store
            .seed(
                &graph,
                vec![
                    Triple::new(id.clone(), Iri::new(vocab::RDF_TYPE), Iri::new(ORG)),
                    Triple::new(id.clone(), Iri::new("http://ex/name"), Literal::string("Wide")),
                    Triple::new(id.clone(), Iri::new("http://ex/extra"), Literal::string("kept")),
                ],
            )
            .unwrap();

        let r = session
            .find("Organization", id)
            .unwrap()
            .include_all()
            .first()
            .unwrap()
            .unwrap();
        let map = r.to_attribute_map();

        assert_eq!(map["id"], serde_json::json!("http://ex/Organization/Wide"));
        assert_eq!(map["name"], serde_json::json!("Wide"));
        assert!(map.contains_key("http://ex/extra"));
    }
}
