//! Property tests for the association differ and the committed slot state.

use devportal_core::db::open_db_in_memory;
use devportal_core::reconcile::differ::diff_associations;
use devportal_core::repo::store::AssociationSlot;
use devportal_core::service::faq_service::{
    CreateFaqCategoryRequest, CreateFaqRequest, UpdateFaqRequest,
};
use devportal_core::{EntityStore, FaqService, SqliteStore};
use proptest::prelude::*;
use std::collections::BTreeSet;
use uuid::Uuid;

const CATEGORY_POOL: usize = 6;

fn id_set() -> impl Strategy<Value = BTreeSet<u8>> {
    prop::collection::btree_set(0u8..32, 0..12)
}

fn pick(pool: &[Uuid], mask: &BTreeSet<usize>) -> Vec<Uuid> {
    mask.iter().map(|index| pool[*index]).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn applying_the_diff_reaches_desired(current in id_set(), desired in id_set()) {
        let diff = diff_associations(&current, &desired);

        prop_assert_eq!(diff.apply_to(&current), desired.clone());
        let removed_then_added: BTreeSet<u8> = current
            .difference(&diff.to_remove.iter().copied().collect())
            .copied()
            .chain(diff.to_add.iter().copied())
            .collect();
        prop_assert_eq!(removed_then_added, desired);
    }

    #[test]
    fn additions_and_removals_are_disjoint_and_sorted(
        current in id_set(),
        desired in id_set(),
    ) {
        let diff = diff_associations(&current, &desired);

        prop_assert!(diff.to_add.iter().all(|id| !diff.to_remove.contains(id)));
        prop_assert!(diff.to_add.iter().all(|id| !current.contains(id)));
        prop_assert!(diff.to_remove.iter().all(|id| !desired.contains(id)));
        prop_assert!(diff.to_add.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(diff.to_remove.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn diffing_a_set_against_itself_is_empty(current in id_set()) {
        prop_assert!(diff_associations(&current, &current).is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn committed_slot_equals_desired_set(
        initial in prop::collection::btree_set(0..CATEGORY_POOL, 0..=CATEGORY_POOL),
        desired in prop::collection::btree_set(0..CATEGORY_POOL, 0..=CATEGORY_POOL),
    ) {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let service = FaqService::new(SqliteStore::new(&conn));
        let pool: Vec<Uuid> = (0..CATEGORY_POOL)
            .map(|index| {
                service
                    .create_category(&CreateFaqCategoryRequest {
                        name: format!("category-{index}"),
                        description: None,
                    })
                    .unwrap()
            })
            .collect();
        let faq_id = service
            .create_faq(&CreateFaqRequest {
                question: "q".to_string(),
                answer: "a".to_string(),
                langcode: "en".to_string(),
                status: Some(true),
                faq_order: Some(1),
                categories: pick(&pool, &initial),
            })
            .unwrap();

        service
            .update_faq(&UpdateFaqRequest {
                id: faq_id,
                question: "q".to_string(),
                answer: "a".to_string(),
                langcode: "en".to_string(),
                status: Some(true),
                faq_order: Some(1),
                categories: Some(pick(&pool, &desired)),
            })
            .unwrap();

        let expected: BTreeSet<Uuid> = pick(&pool, &desired).into_iter().collect();
        let linked = store
            .list_association_ids(faq_id, AssociationSlot::FaqCategories)
            .unwrap();
        prop_assert_eq!(linked, expected);
        let rows = store
            .association_rows(faq_id, AssociationSlot::FaqCategories)
            .unwrap();
        prop_assert_eq!(rows.len(), desired.len());
    }
}
