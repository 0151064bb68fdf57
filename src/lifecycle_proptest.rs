#![cfg(test)]

// Property tests for the control block lifecycle, kept inside the crate so
// they can read the per-thread live block counter.
//
// Model: per payload, the number of outstanding owners and observers.
// Invariants checked after every step:
//  - every handle's use_count()/weak_count() equals the model's counts;
//  - a payload is disposed exactly once, as soon as its owner count is 0;
//  - observers of a disposed payload are expired and lock() yields empty;
//  - live blocks == payloads with any outstanding owner or observer.

use crate::block::live_blocks;
use crate::produce::produce;
use crate::shared::Shared;
use crate::weak::Weak;
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

struct Probe {
    id: usize,
    field: u32,
    log: Rc<RefCell<Vec<usize>>>,
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.id);
    }
}

// Owners either expose the whole payload or, after aliasing, one field.
enum Owner {
    Whole(Shared<Probe>),
    Part(Shared<u32>),
}

impl Owner {
    fn use_count(&self) -> usize {
        match self {
            Owner::Whole(s) => Shared::use_count(s),
            Owner::Part(s) => Shared::use_count(s),
        }
    }
    fn weak_count(&self) -> usize {
        match self {
            Owner::Whole(s) => Shared::weak_count(s),
            Owner::Part(s) => Shared::weak_count(s),
        }
    }
    fn is_empty(&self) -> bool {
        match self {
            Owner::Whole(s) => Shared::is_empty(s),
            Owner::Part(s) => Shared::is_empty(s),
        }
    }
}

enum Observer {
    Whole(Weak<Probe>),
    Part(Weak<u32>),
}

impl Observer {
    fn use_count(&self) -> usize {
        match self {
            Observer::Whole(w) => w.use_count(),
            Observer::Part(w) => w.use_count(),
        }
    }
    fn expired(&self) -> bool {
        match self {
            Observer::Whole(w) => w.expired(),
            Observer::Part(w) => w.expired(),
        }
    }
    fn lock(&self) -> Owner {
        match self {
            Observer::Whole(w) => Owner::Whole(w.lock()),
            Observer::Part(w) => Owner::Part(w.lock()),
        }
    }
    fn promote(&self) -> Option<Owner> {
        match self {
            Observer::Whole(w) => Shared::promote(w).ok().map(Owner::Whole),
            Observer::Part(w) => Shared::promote(w).ok().map(Owner::Part),
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Produce,
    Adopt,
    CloneOwner(usize),
    AliasOwner(usize),
    DropOwner(usize),
    TakeOwner(usize),
    Downgrade(usize),
    CloneObserver(usize),
    DropObserver(usize),
    Lock(usize),
    Promote(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Produce),
        Just(Op::Adopt),
        (0usize..16).prop_map(Op::CloneOwner),
        (0usize..16).prop_map(Op::AliasOwner),
        (0usize..16).prop_map(Op::DropOwner),
        (0usize..16).prop_map(Op::TakeOwner),
        (0usize..16).prop_map(Op::Downgrade),
        (0usize..16).prop_map(Op::CloneObserver),
        (0usize..16).prop_map(Op::DropObserver),
        (0usize..16).prop_map(Op::Lock),
        (0usize..16).prop_map(Op::Promote),
    ]
}

proptest! {
    #[test]
    fn prop_block_lifecycle(ops in proptest::collection::vec(arb_op(), 1..160)) {
        let baseline = live_blocks();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut owners: Vec<(usize, Owner)> = Vec::new();
        let mut observers: Vec<(usize, Observer)> = Vec::new();
        let mut strong: Vec<usize> = Vec::new();
        let mut weak: Vec<usize> = Vec::new();

        for op in ops {
            match op {
                Op::Produce | Op::Adopt => {
                    let id = strong.len();
                    let probe = Probe { id, field: id as u32, log: log.clone() };
                    let s = match op {
                        Op::Produce => produce(probe),
                        _ => Shared::adopt(Box::new(probe)),
                    };
                    owners.push((id, Owner::Whole(s)));
                    strong.push(1);
                    weak.push(0);
                }
                Op::CloneOwner(i) if !owners.is_empty() => {
                    let (id, o) = &owners[i % owners.len()];
                    let (id, c) = match o {
                        Owner::Whole(s) => (*id, Owner::Whole(s.clone())),
                        Owner::Part(s) => (*id, Owner::Part(s.clone())),
                    };
                    owners.push((id, c));
                    strong[id] += 1;
                }
                Op::AliasOwner(i) if !owners.is_empty() => {
                    let (id, o) = &owners[i % owners.len()];
                    let id = *id;
                    if let Owner::Whole(s) = o {
                        let part = Shared::map(s, |p| &p.field);
                        prop_assert_eq!(*part, id as u32);
                        owners.push((id, Owner::Part(part)));
                        strong[id] += 1;
                    }
                }
                Op::DropOwner(i) if !owners.is_empty() => {
                    let (id, o) = owners.swap_remove(i % owners.len());
                    drop(o);
                    strong[id] -= 1;
                }
                Op::TakeOwner(i) if !owners.is_empty() => {
                    let idx = i % owners.len();
                    let (id, o) = &mut owners[idx];
                    let before = o.use_count();
                    let moved = match o {
                        Owner::Whole(s) => Owner::Whole(Shared::take(s)),
                        Owner::Part(s) => Owner::Part(Shared::take(s)),
                    };
                    prop_assert!(o.is_empty());
                    prop_assert_eq!(o.use_count(), 0);
                    prop_assert_eq!(moved.use_count(), before);
                    let id = *id;
                    owners[idx] = (id, moved);
                }
                Op::Downgrade(i) if !owners.is_empty() => {
                    let (id, o) = &owners[i % owners.len()];
                    let id = *id;
                    let w = match o {
                        Owner::Whole(s) => Observer::Whole(Shared::downgrade(s)),
                        Owner::Part(s) => Observer::Part(Shared::downgrade(s)),
                    };
                    weak[id] += 1;
                    observers.push((id, w));
                }
                Op::CloneObserver(i) if !observers.is_empty() => {
                    let (id, w) = &observers[i % observers.len()];
                    let id = *id;
                    let c = match w {
                        Observer::Whole(w) => Observer::Whole(w.clone()),
                        Observer::Part(w) => Observer::Part(w.clone()),
                    };
                    weak[id] += 1;
                    observers.push((id, c));
                }
                Op::DropObserver(i) if !observers.is_empty() => {
                    let (id, w) = observers.swap_remove(i % observers.len());
                    drop(w);
                    weak[id] -= 1;
                }
                Op::Lock(i) if !observers.is_empty() => {
                    let (id, w) = &observers[i % observers.len()];
                    let id = *id;
                    let o = w.lock();
                    if strong[id] > 0 {
                        prop_assert!(!o.is_empty());
                        strong[id] += 1;
                        owners.push((id, o));
                    } else {
                        prop_assert!(o.is_empty());
                    }
                }
                Op::Promote(i) if !observers.is_empty() => {
                    let (id, w) = &observers[i % observers.len()];
                    let id = *id;
                    match w.promote() {
                        Some(o) => {
                            prop_assert!(strong[id] > 0);
                            strong[id] += 1;
                            owners.push((id, o));
                        }
                        None => prop_assert_eq!(strong[id], 0),
                    }
                }
                _ => {}
            }

            for (id, o) in &owners {
                prop_assert_eq!(o.use_count(), strong[*id]);
                prop_assert_eq!(o.weak_count(), weak[*id]);
            }
            for (id, w) in &observers {
                prop_assert_eq!(w.use_count(), strong[*id]);
                prop_assert_eq!(w.expired(), strong[*id] == 0);
            }

            // Each payload is disposed exactly once, and only once unowned.
            let mut disposed = log.borrow().clone();
            disposed.sort_unstable();
            let expected: Vec<usize> = (0..strong.len()).filter(|&id| strong[id] == 0).collect();
            prop_assert_eq!(disposed, expected);

            let tracked = (0..strong.len()).filter(|&id| strong[id] + weak[id] > 0).count();
            prop_assert_eq!(live_blocks() - baseline, tracked);
        }

        drop(owners);
        drop(observers);
        prop_assert_eq!(live_blocks(), baseline);
        prop_assert_eq!(log.borrow().len(), strong.len());
    }
}
