use labspace_core::remote::types::LabPayload;
use labspace_core::{
    add_subject_to_default_category, create_new_category, delete_category, find_default_category,
    find_subject_category, move_subject_between_categories, remove_subject_from_categories,
    CanonicalSubjectId, Category, CategoryId, CategoryKind, LabId, LabTree, Subject,
    SubjectMetrics, TreeError, TreeInvariantError, DEFAULT_CATEGORY_ID,
};
use uuid::Uuid;

fn subject(slug: &str) -> Subject {
    Subject::new(
        CanonicalSubjectId::parse(slug).unwrap(),
        format!("Subject {slug}"),
        CategoryId::new(DEFAULT_CATEGORY_ID),
    )
}

/// Default bucket with `d1`, custom `c1` holding `s1, s2`, empty custom `c2`.
fn seeded_tree() -> LabTree {
    let mut default = Category::default_bucket();
    let mut d1 = subject("d1");
    d1.category_id = default.id.clone();
    default.subjects.push(d1);

    let mut materials = Category::new(CategoryId::new("c1"), "Materials", CategoryKind::Custom);
    for slug in ["s1", "s2"] {
        let mut item = subject(slug);
        item.category_id = materials.id.clone();
        materials.subjects.push(item);
    }
    let devices = Category::new(CategoryId::new("c2"), "Devices", CategoryKind::Custom);
    LabTree::new(LabId::new("lab-1"), vec![default, materials, devices])
}

fn local_id(tree: &LabTree, slug: &str) -> Uuid {
    tree.find_by_canonical(&CanonicalSubjectId::parse(slug).unwrap())
        .unwrap()
        .id
}

#[test]
fn new_tree_synthesizes_missing_default_category() {
    let tree = LabTree::new(
        LabId::new("lab-1"),
        vec![Category::new(
            CategoryId::new("c1"),
            "Materials",
            CategoryKind::Custom,
        )],
    );
    let default = find_default_category(&tree).unwrap();
    assert_eq!(default.id, CategoryId::new(DEFAULT_CATEGORY_ID));
    assert_eq!(default.name, "Uncategorized");
    assert_eq!(tree.categories()[0].id, default.id);
    tree.check_invariants().unwrap();
}

#[test]
fn new_tree_demotes_extra_default_categories() {
    let tree = LabTree::new(
        LabId::new("lab-1"),
        vec![
            Category::new(CategoryId::new("a"), "First", CategoryKind::Default),
            Category::new(CategoryId::new("b"), "Second", CategoryKind::Default),
        ],
    );
    tree.check_invariants().unwrap();
    assert_eq!(
        tree.category(&CategoryId::new("b")).unwrap().kind,
        CategoryKind::Custom
    );
}

#[test]
fn add_places_subject_in_default_with_back_reference() {
    let tree = seeded_tree();
    let mut added = subject("abc123");
    added.category_id = CategoryId::new("c1");
    let next = add_subject_to_default_category(&tree, added);

    let stored = next
        .find_by_canonical(&CanonicalSubjectId::parse("fsid_abc123").unwrap())
        .unwrap();
    assert_eq!(stored.subject_id.as_str(), "fsid_abc123");
    assert_eq!(stored.subject_slug, "abc123");
    assert_eq!(stored.category_id, CategoryId::new(DEFAULT_CATEGORY_ID));
    next.check_invariants().unwrap();
}

#[test]
fn add_without_default_category_leaves_tree_unchanged() {
    let tree = LabTree::from_raw(
        LabId::new("lab-1"),
        vec![Category::new(
            CategoryId::new("c1"),
            "Materials",
            CategoryKind::Custom,
        )],
    );
    let next = add_subject_to_default_category(&tree, subject("x1"));
    assert_eq!(next, tree);
    assert_eq!(
        tree.try_add_subject_to_default(subject("x1")),
        Err(TreeError::DefaultCategoryMissing)
    );
}

#[test]
fn duplicate_canonical_id_is_rejected() {
    let tree = seeded_tree();
    let err = tree.try_add_subject_to_default(subject("fsid_s1")).unwrap_err();
    assert!(matches!(err, TreeError::DuplicateSubject(_)));
}

#[test]
fn move_relocates_subject_and_keeps_identity() {
    let tree = seeded_tree();
    let s1 = local_id(&tree, "s1");
    let next =
        move_subject_between_categories(&tree, s1, &CategoryId::new("c1"), &CategoryId::new("c2"));

    let holder = find_subject_category(&next, s1).unwrap();
    assert_eq!(holder.id, CategoryId::new("c2"));
    assert_eq!(next.find_subject(s1).unwrap().category_id, holder.id);
    assert_eq!(
        next.category(&CategoryId::new("c1")).unwrap().subjects.len(),
        1
    );
    next.check_invariants().unwrap();
}

#[test]
fn move_to_same_category_is_identical() {
    let tree = seeded_tree();
    let s1 = local_id(&tree, "s1");
    let next =
        move_subject_between_categories(&tree, s1, &CategoryId::new("c1"), &CategoryId::new("c1"));
    assert_eq!(next, tree);
    assert_eq!(
        serde_json::to_string(&next).unwrap(),
        serde_json::to_string(&tree).unwrap()
    );
}

#[test]
fn move_with_unknown_ids_is_fail_soft() {
    let tree = seeded_tree();
    let s1 = local_id(&tree, "s1");
    let unknown_category =
        move_subject_between_categories(&tree, s1, &CategoryId::new("c1"), &CategoryId::new("zz"));
    assert_eq!(unknown_category, tree);

    let wrong_source =
        move_subject_between_categories(&tree, s1, &CategoryId::new("c2"), &CategoryId::new("c1"));
    assert_eq!(wrong_source, tree);
    assert!(matches!(
        tree.try_move_subject(s1, &CategoryId::new("c2"), &CategoryId::new("c1")),
        Err(TreeError::SubjectNotInCategory { .. })
    ));
}

#[test]
fn remove_is_idempotent() {
    let tree = seeded_tree();
    let s1 = local_id(&tree, "s1");
    let once = remove_subject_from_categories(&tree, s1);
    assert!(once.find_subject(s1).is_none());
    let twice = remove_subject_from_categories(&once, s1);
    assert_eq!(twice, once);
}

#[test]
fn delete_with_redistribution_moves_members_to_default() {
    let tree = seeded_tree();
    let s1 = local_id(&tree, "s1");
    let s2 = local_id(&tree, "s2");
    let next = delete_category(&tree, &CategoryId::new("c1"), true);

    assert!(next.category(&CategoryId::new("c1")).is_none());
    let default = next.default_category().unwrap();
    let ids: Vec<_> = default.subjects.iter().map(|item| item.id).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&s1) && ids.contains(&s2));
    for id in [s1, s2] {
        assert_eq!(next.find_subject(id).unwrap().category_id, default.id);
    }
    next.check_invariants().unwrap();
}

#[test]
fn delete_without_redistribution_drops_members() {
    let tree = seeded_tree();
    let s1 = local_id(&tree, "s1");
    let s2 = local_id(&tree, "s2");
    let next = delete_category(&tree, &CategoryId::new("c1"), false);
    assert!(next.find_subject(s1).is_none());
    assert!(next.find_subject(s2).is_none());
    assert_eq!(next.subject_count(), 1);
}

#[test]
fn default_category_is_never_deleted() {
    let tree = seeded_tree();
    let default_id = tree.default_category().unwrap().id.clone();
    assert_eq!(delete_category(&tree, &default_id, true), tree);
    assert_eq!(
        tree.try_delete_category(&default_id, false),
        Err(TreeError::SpecialCategory(default_id))
    );
}

#[test]
fn legacy_exclude_category_is_special() {
    let tree = LabTree::new(
        LabId::new("lab-1"),
        vec![
            Category::default_bucket(),
            Category::new(CategoryId::new("x"), "Excluded", CategoryKind::LegacyExclude),
        ],
    );
    assert_eq!(delete_category(&tree, &CategoryId::new("x"), true), tree);
    assert!(tree
        .try_rename_category(&CategoryId::new("x"), "Other")
        .is_err());
}

#[test]
fn create_new_category_validates_and_mints_provisional_id() {
    let tree = seeded_tree();
    let category = create_new_category(&tree, "  Sensors ").unwrap();
    assert_eq!(category.name, "Sensors");
    assert_eq!(category.kind, CategoryKind::Custom);
    assert!(category.subjects.is_empty());
    assert!(category.id.is_provisional());

    let err = create_new_category(&tree, "materials").unwrap_err();
    assert_eq!(err.reason(), "duplicate");
}

#[test]
fn replacing_category_id_cascades_into_subjects() {
    let tree = seeded_tree();
    let next = tree
        .try_replace_category_id(&CategoryId::new("c1"), &CategoryId::new("srv-9"))
        .unwrap();
    let category = next.category(&CategoryId::new("srv-9")).unwrap();
    assert!(category
        .subjects
        .iter()
        .all(|item| item.category_id == category.id));
    next.check_invariants().unwrap();

    assert_eq!(
        tree.try_replace_category_id(&CategoryId::new("c1"), &CategoryId::new("c2")),
        Err(TreeError::DuplicateCategory(CategoryId::new("c2")))
    );
}

#[test]
fn invariant_checker_detects_broken_back_reference() {
    let tree = seeded_tree();
    let mut categories = tree.categories().to_vec();
    categories[1].subjects[0].category_id = CategoryId::new("c2");
    let broken = LabTree::from_raw(LabId::new("lab-1"), categories);
    assert!(matches!(
        broken.check_invariants(),
        Err(TreeInvariantError::BrokenBackReference { .. })
    ));
}

#[test]
fn metrics_merge_keeps_absent_values_absent() {
    let tree = seeded_tree();
    let s1 = CanonicalSubjectId::parse("s1").unwrap();
    let unknown = CanonicalSubjectId::parse("nobody").unwrap();
    let metrics = SubjectMetrics {
        horizon_rank: Some(0.4),
        tech_transfer: None,
        white_space: Some(0.0),
    };
    let (next, updated) = tree.with_metrics([(&s1, &metrics), (&unknown, &metrics)]);
    assert_eq!(updated, 1);
    let stored = &next.find_by_canonical(&s1).unwrap().metrics;
    assert_eq!(stored.horizon_rank, Some(0.4));
    assert_eq!(stored.tech_transfer, None);
    assert_eq!(stored.white_space, Some(0.0));
    assert!(next
        .find_by_canonical(&CanonicalSubjectId::parse("s2").unwrap())
        .unwrap()
        .metrics
        .is_pending());
}

#[test]
fn lab_payload_normalizes_ids_and_kinds() {
    let payload: LabPayload = serde_json::from_str(
        r#"{
            "labId": "lab-7",
            "categories": [
                {"id": "c1", "name": "Materials", "type": "custom", "subjects": [
                    {"subjectId": "abc", "subjectName": "Abc", "addedAt": 5},
                    {"subjectId": "fsid_abc", "subjectName": "Abc dup"},
                    {"subjectId": "bad id", "subjectName": "Broken"}
                ]},
                {"id": "x", "name": "Excluded", "type": "EXCLUDE"}
            ]
        }"#,
    )
    .unwrap();
    let tree = payload.into_tree();
    tree.check_invariants().unwrap();

    assert_eq!(tree.lab_id(), &LabId::new("lab-7"));
    assert!(tree.default_category().is_some());
    assert_eq!(
        tree.category(&CategoryId::new("x")).unwrap().kind,
        CategoryKind::LegacyExclude
    );
    let materials = tree.category(&CategoryId::new("c1")).unwrap();
    assert_eq!(materials.subjects.len(), 1);
    assert_eq!(materials.subjects[0].subject_id.as_str(), "fsid_abc");
    assert_eq!(materials.subjects[0].subject_slug, "abc");
    assert_eq!(materials.subjects[0].added_at, 5);
}
