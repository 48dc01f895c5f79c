use komodo_core::dictionary::TermDictionary;
use komodo_core::postings::PostingsStore;
use komodo_core::store::RecordStore;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};

fn postings() -> PostingsStore {
    let store = RecordStore::temporary().unwrap();
    let dict = TermDictionary::open(&store).unwrap();
    PostingsStore::new(&store, dict)
}

#[test]
fn only_posting_removal_retires_the_term() {
    let p = postings();
    p.add_posting("solo", "d1", &[0]).unwrap();
    assert!(p.dictionary().lookup("solo").unwrap().is_some());
    p.remove_posting("solo", "d1").unwrap();
    assert!(p.dictionary().lookup("solo").unwrap().is_none());
    assert_eq!(p.dictionary().count(), 0);
}

#[test]
fn shared_term_mapping_survives_partial_removal() {
    let p = postings();
    p.add_posting("shared", "d1", &[0]).unwrap();
    p.add_posting("shared", "d2", &[1]).unwrap();
    let before = p.dictionary().lookup("shared").unwrap().unwrap();
    p.remove_posting("shared", "d1").unwrap();
    let after = p.dictionary().lookup("shared").unwrap().unwrap();
    assert_eq!(before.collection_id, after.collection_id);
    assert_eq!(before.created_at, after.created_at);
}

#[test]
fn merge_accumulates_frequency_and_positions() {
    let p = postings();
    p.add_posting("t", "d", &[1, 2]).unwrap();
    p.add_posting("t", "d", &[3]).unwrap();
    let all = p.scan("t", 0, 10).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].frequency, 3);
    assert_eq!(all[0].positions, vec![1, 2, 3]);
}

#[test]
fn paging_visits_every_posting_once_despite_other_writes() {
    let p = postings();
    for i in 0..25 {
        p.add_posting("paged", &format!("d{i:02}"), &[i]).unwrap();
    }

    let mut seen = Vec::new();
    let mut offset = 0;
    loop {
        let page = p.scan("paged", offset, 4).unwrap();
        if page.is_empty() {
            break;
        }
        offset += page.len();
        seen.extend(page.into_iter().map(|x| x.document_id));
        // Unrelated terms written between pages must not disturb the order.
        p.add_posting("noise", &format!("n{offset}"), &[0]).unwrap();
    }

    let expected: Vec<String> = (0..25).map(|i| format!("d{i:02}")).collect();
    assert_eq!(seen, expected);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 25);
}

#[test]
fn concurrent_writers_keep_one_posting_per_document() {
    let p = Arc::new(postings());
    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let p = Arc::clone(&p);
            std::thread::spawn(move || {
                p.add_posting("hot", "same-doc", &[i]).unwrap();
                p.add_posting("hot", &format!("doc{i}"), &[i]).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(p.count("hot").unwrap(), 9);
    let merged = p.get("hot", "same-doc").unwrap().unwrap();
    assert_eq!(merged.frequency, 8);
    let mut positions = merged.positions.clone();
    positions.sort_unstable();
    assert_eq!(positions, (0..8).collect::<Vec<u32>>());
}

#[test]
fn adds_racing_the_last_removal_all_land() {
    let p = Arc::new(postings());
    for round in 0..300 {
        let term = format!("churn{round}");
        p.add_posting(&term, "leaving", &[0]).unwrap();

        let barrier = Arc::new(Barrier::new(3));
        let remover = {
            let (p, barrier, term) = (Arc::clone(&p), Arc::clone(&barrier), term.clone());
            std::thread::spawn(move || {
                barrier.wait();
                p.remove_posting(&term, "leaving").unwrap()
            })
        };
        let adders: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|doc| {
                let (p, barrier, term) = (Arc::clone(&p), Arc::clone(&barrier), term.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    p.add_posting(&term, doc, &[1])
                })
            })
            .collect();

        assert!(remover.join().unwrap());
        for adder in adders {
            assert!(adder.join().unwrap().is_ok(), "add failed in round {round}");
        }
        assert!(p.get(&term, "a").unwrap().is_some(), "posting a lost in round {round}");
        assert!(p.get(&term, "b").unwrap().is_some(), "posting b lost in round {round}");
        assert!(p.get(&term, "leaving").unwrap().is_none());
        assert_eq!(p.count(&term).unwrap(), 2);
    }
}
