// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use pretty_assertions::assert_eq;

use waveling::arena::Arena;
use waveling::arena::HandleSet;
use waveling::arena::SupplementalArena;

#[test]
fn can_allocate_in_arena() {
    let mut arena = Arena::new();
    let hello1 = arena.add("hello".to_string());
    let hello2 = arena.add("hello".to_string());
    let there = arena.add("there".to_string());
    assert_ne!(hello1, hello2);
    assert_ne!(hello1, there);
    assert_ne!(hello2, there);
    assert_eq!(arena.get(hello1), arena.get(hello2));
    assert_ne!(arena.get(hello1), arena.get(there));
    assert_eq!(arena.len(), 3);
}

#[test]
fn handles_are_dense() {
    let mut arena = Arena::new();
    let a = arena.add(1u32);
    let b = arena.add(2u32);
    assert_eq!(a.as_dense(), 0);
    assert_eq!(b.as_dense(), 1);
    let handles: Vec<_> = arena.iter_handles().collect();
    assert_eq!(handles, vec![a, b]);
}

#[test]
fn can_allocate_in_supplemental_arena() {
    let mut arena = Arena::<u32>::new();
    let handle = arena.add(1);

    let mut supplemental = SupplementalArena::<u32, String>::new();
    assert_eq!(supplemental.get(handle), None);
    supplemental[handle] = "hello".to_string();
    assert_eq!(supplemental[handle].as_str(), "hello");
}

#[test]
fn supplemental_arena_defaults_in_mutable_context() {
    let mut arena = Arena::<u32>::new();
    let handle = arena.add(1);

    let mut supplemental = SupplementalArena::<u32, Vec<u32>>::new();
    supplemental[handle].push(7);
    assert_eq!(supplemental[handle], vec![7]);
}

#[test]
fn handle_sets_add_remove_and_iterate() {
    let mut arena = Arena::new();
    let handles: Vec<_> = (0..10u32).map(|i| arena.add(i)).collect();

    let mut set = HandleSet::new();
    for handle in handles.iter().step_by(2) {
        set.add(*handle);
    }
    assert_eq!(set.len(), 5);
    assert!(set.contains(handles[0]));
    assert!(!set.contains(handles[1]));

    set.remove(handles[0]);
    assert!(!set.contains(handles[0]));
    assert_eq!(set.len(), 4);

    let members: Vec<_> = set.iter().collect();
    assert_eq!(members, vec![handles[2], handles[4], handles[6], handles[8]]);
}
