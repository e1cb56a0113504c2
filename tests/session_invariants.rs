//! Property tests for session collection invariants.

use mau::core::SessionRepository;
use mau::core::state::Message;
use mau::storage::{KeyValueStore, MemoryBackend};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Delete(usize),
    Select(usize),
    Append(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Create),
        any::<usize>().prop_map(Op::Delete),
        any::<usize>().prop_map(Op::Select),
        any::<usize>().prop_map(Op::Append),
    ]
}

fn pick(repo: &SessionRepository, index: usize) -> String {
    let sessions = repo.sessions();
    sessions[index % sessions.len()].id.clone()
}

fn apply(repo: &mut SessionRepository, op: &Op) {
    match op {
        Op::Create => {
            repo.create_session().unwrap();
        }
        Op::Delete(i) => {
            let id = pick(repo, *i);
            repo.delete_session(&id).unwrap();
        }
        Op::Select(i) => {
            let id = pick(repo, *i);
            repo.select_session(&id).unwrap();
        }
        Op::Append(i) => {
            let id = pick(repo, *i);
            let mut messages = repo.session(&id).unwrap().messages.clone();
            messages.push(Message::user("hi"));
            repo.append_messages(&id, messages).unwrap();
        }
    }
}

fn assert_invariants(repo: &SessionRepository) {
    assert!(!repo.sessions().is_empty());

    let current = repo.current_session_id().unwrap();
    assert!(repo.session(current).is_some(), "dangling current pointer");

    let ids: HashSet<&str> = repo.sessions().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), repo.sessions().len(), "duplicate session ids");

    for session in repo.sessions() {
        assert!(session.updated_at >= session.created_at);
    }
}

proptest! {
    #[test]
    fn current_session_always_exists(ops in prop::collection::vec(op(), 1..40)) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryBackend::new());
        let mut repo = SessionRepository::open(Arc::clone(&store)).unwrap();
        assert_invariants(&repo);

        for op in &ops {
            apply(&mut repo, op);
            assert_invariants(&repo);
        }

        // A fresh load sees the same collection and pointer
        let reopened = SessionRepository::open(store).unwrap();
        prop_assert_eq!(reopened.sessions(), repo.sessions());
        prop_assert_eq!(reopened.current_session_id(), repo.current_session_id());
    }
}

#[test]
fn deleting_only_session_creates_replacement() {
    let mut repo = SessionRepository::open(Arc::new(MemoryBackend::new())).unwrap();
    let only = repo.current_session_id().unwrap().to_string();

    repo.delete_session(&only).unwrap();

    assert_eq!(repo.sessions().len(), 1);
    let replacement = repo.current_session().unwrap();
    assert_ne!(replacement.id, only);
    assert_eq!(replacement.messages.len(), 1);
}

#[test]
fn deleting_current_elects_most_recently_updated() {
    let mut repo = SessionRepository::open(Arc::new(MemoryBackend::new())).unwrap();
    let oldest = repo.current_session_id().unwrap().to_string();
    let middle = repo.create_session().unwrap().id;
    let newest = repo.create_session().unwrap().id;

    // Touch the oldest so it becomes the most recently updated
    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut messages = repo.session(&oldest).unwrap().messages.clone();
    messages.push(Message::user("still here"));
    repo.append_messages(&oldest, messages).unwrap();

    repo.select_session(&newest).unwrap();
    repo.delete_session(&newest).unwrap();

    assert_eq!(repo.current_session_id(), Some(oldest.as_str()));
    assert!(repo.session(&middle).is_some());
}
