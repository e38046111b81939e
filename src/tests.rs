use std::sync::Arc;

use parking_lot::Mutex;

use crate::alloc::{code, compile, frame, func, list, name, string};
use crate::api::{Kind, Value};
use crate::compact::CollectKind;
use crate::heap::{Heap, HeapOptions, RootHook, RootVisitor};

fn test_heap(pool_size: u32) -> Heap {
    Heap::new(HeapOptions {
        pool_size,
        ..Default::default()
    })
}

#[test]
fn bump_allocation() {
    let mut heap = test_heap(4096);
    let a = heap.alloc(10).unwrap();
    assert_eq!(a, 0);
    assert_eq!(heap.top(), 12);
    let b = heap.alloc(6).unwrap();
    assert_eq!(b, 12);
    assert_eq!(heap.top(), 20);
    assert_eq!(heap.free(), 4076);
}

#[test]
fn allocation_is_zeroed() {
    let mut heap = test_heap(4096);
    let a = heap.alloc(16).unwrap();
    heap.write_slice(a, &[0xab; 16]);
    // nothing roots it, so a full collection reclaims the bytes
    heap.collect(CollectKind::Full);
    assert_eq!(heap.top(), 0);
    let b = heap.alloc(16).unwrap();
    assert_eq!(b, 0);
    assert!(heap.slice(b, 16).iter().all(|&byte| byte == 0));
}

#[test]
fn allocation_failure_triggers_collection() {
    let mut heap = test_heap(4096);
    let globals = heap.add_root(&frame::FRAME_TYPE);
    frame::push(&mut heap, globals, 3).unwrap();

    let mut l = list::new(&mut heap, 0).unwrap();
    for s in ["aaa", "bbb", "ccc"] {
        let s = string::new(&mut heap, s).unwrap();
        l = list::push(&mut heap, l, Value::string(s)).unwrap();
    }
    let frame_addr = heap.root(globals).offset();
    frame::set_var(&mut heap, frame_addr, 0, Value::list(l));
    assert_eq!(
        string::as_str(&heap, list::get(&heap, l.offset(), 1).offset()),
        "bbb"
    );

    // drop the list and allocate more than is currently free
    frame::set_var(&mut heap, frame_addr, 0, Value::NULL);
    let big = heap.alloc(4076).unwrap();
    assert_eq!(big, 20);
    assert_eq!(heap.free(), 0);
    assert_eq!(heap.statistics().full_collections, 1);
}

#[test]
fn moved_reference_is_rewritten() {
    let mut heap = test_heap(4096);
    string::new(&mut heap, "garbage").unwrap();
    let keep = string::new(&mut heap, "precious").unwrap();
    assert_eq!(keep.offset(), 12);

    heap.stash(Value::string(keep));
    heap.collect(CollectKind::Full);
    let fetched = heap.fetch();

    assert_eq!(fetched.kind(), Kind::String);
    assert_eq!(fetched.offset(), 0);
    assert_eq!(string::as_str(&heap, fetched.offset()), "precious");
}

#[test]
fn deep_list_nesting_is_preserved() {
    let mut heap = test_heap(64 * 1024);
    string::new(&mut heap, "shift everything down").unwrap();

    let mut inner = list::new(&mut heap, 0).unwrap();
    for _ in 0..999 {
        heap.stash(Value::list(inner));
        let outer = list::new(&mut heap, 0).unwrap();
        let inner_value = heap.fetch();
        inner = list::push(&mut heap, outer, inner_value).unwrap();
    }

    heap.stash(Value::list(inner));
    heap.collect(CollectKind::Full);
    let mut value = heap.fetch();

    for _ in 0..999 {
        assert_eq!(value.kind(), Kind::List);
        let addr = value.offset();
        assert!(!list::noted(&heap, addr));
        assert_eq!(list::len(&heap, addr), 1);
        value = list::get(&heap, addr, 0);
    }
    assert_eq!(value.kind(), Kind::List);
    assert_eq!(list::len(&heap, value.offset()), 0);
}

#[test]
fn window_overflow_compacts_in_passes() {
    // 22 live objects against an 8-entry window forces several passes
    let mut heap = Heap::new(HeapOptions {
        pool_size: 4096,
        chunk_window: Some(8),
        ..Default::default()
    });
    string::new(&mut heap, "early garbage").unwrap();

    let root = heap.add_root(&list::LIST_TYPE);
    let l = list::new(&mut heap, 0).unwrap();
    heap.set_root(root, l);
    for at in 0..20u16 {
        if at % 5 == 0 {
            string::new(&mut heap, "interleaved garbage").unwrap();
        }
        let s = string::new(&mut heap, &format!("s-{:02}", at)).unwrap();
        let l = heap.root(root);
        let l = list::push(&mut heap, l, Value::string(s)).unwrap();
        heap.set_root(root, l);
    }

    heap.collect(CollectKind::Full);

    // list header + 32-slot blob + 20 eight-byte strings
    assert_eq!(heap.top(), 12 + 128 + 20 * 8);
    let addr = heap.root(root).offset();
    assert_eq!(list::capacity(&heap, addr), 32);
    let mut offsets = Vec::new();
    for at in 0..20u16 {
        let value = list::get(&heap, addr, at);
        assert_eq!(string::as_str(&heap, value.offset()), format!("s-{:02}", at));
        assert!(value.offset() < heap.top());
        offsets.push(value.offset());
    }
    // the slide preserves relative order
    assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn incremental_upgrades_to_full_every_128() {
    let mut heap = test_heap(4096);
    let keep = string::new(&mut heap, "keep").unwrap();
    heap.stash(Value::string(keep));

    heap.collect(CollectKind::Full);
    assert_eq!(heap.statistics().full_collections, 1);
    assert!(heap.statistics().last_top > 0);

    for _ in 0..127 {
        heap.collect(CollectKind::Incremental);
    }
    assert_eq!(heap.statistics().full_collections, 1);
    assert_eq!(heap.statistics().total_collections, 128);

    // the 128th incremental call upgrades and resets the counter
    heap.collect(CollectKind::Incremental);
    assert_eq!(heap.statistics().full_collections, 2);
    heap.collect(CollectKind::Incremental);
    assert_eq!(heap.statistics().full_collections, 2);
}

#[test]
fn incremental_leaves_settled_objects_alone() {
    let mut heap = test_heap(4096);
    let globals = heap.add_root(&frame::FRAME_TYPE);
    frame::push(&mut heap, globals, 2).unwrap();
    let settled = string::new(&mut heap, "settled").unwrap();
    let frame_addr = heap.root(globals).offset();
    frame::set_var(&mut heap, frame_addr, 0, Value::string(settled));

    heap.collect(CollectKind::Full);
    let frame_addr = heap.root(globals).offset();
    let settled_offset = frame::get_var(&heap, frame_addr, 0).offset();
    let last_top = heap.statistics().last_top;
    assert_eq!(last_top, heap.top());

    for _ in 0..3 {
        string::new(&mut heap, "transient").unwrap();
    }
    let young = string::new(&mut heap, "young").unwrap();
    frame::set_var(&mut heap, frame_addr, 1, Value::string(young));
    assert!(young.offset() > last_top);

    heap.collect(CollectKind::Incremental);

    assert_eq!(heap.root(globals).offset(), frame_addr);
    assert_eq!(frame::get_var(&heap, frame_addr, 0).offset(), settled_offset);
    assert_eq!(frame::get_var(&heap, frame_addr, 1).offset(), last_top);
    assert_eq!(heap.top(), last_top + 12);
    assert_eq!(heap.statistics().full_collections, 1);
}

#[test]
fn stash_is_lifo_and_fetch_clears() {
    let mut heap = test_heap(1024);
    heap.stash(Value::float(1.0));
    heap.stash(Value::float(2.0));
    assert_eq!(heap.fetch().as_f32(), Some(2.0));
    assert_eq!(heap.fetch().as_f32(), Some(1.0));
}

#[test]
#[should_panic(expected = "stash underflow")]
fn stash_underflow_asserts() {
    let mut heap = test_heap(1024);
    heap.fetch();
}

#[test]
fn mark_blob_is_idempotent() {
    let mut heap = test_heap(1024);
    let a = heap.alloc(8).unwrap();
    assert!(!heap.mark_blob(a, 8));
    assert!(heap.mark_blob(a, 8));
}

#[test]
fn out_of_memory_is_reported() {
    let mut heap = test_heap(64);
    let s = string::new(&mut heap, &"x".repeat(28)).unwrap();
    heap.stash(Value::string(s));

    let err = heap.alloc(64).unwrap_err();
    assert_eq!(err.requested, 64);
    assert!(err.to_string().contains("out of memory"));

    // the rooted string survived both emergency collections
    let fetched = heap.fetch();
    assert_eq!(string::as_str(&heap, fetched.offset()), "x".repeat(28));
}

struct StackHook {
    values: Arc<Mutex<Vec<Value>>>,
}

impl RootHook for StackHook {
    fn run(&mut self, roots: &mut RootVisitor<'_>) {
        for value in self.values.lock().iter_mut() {
            roots.visit_value(value);
        }
    }
}

#[test]
fn hook_roots_survive_and_are_rewritten() {
    let mut heap = test_heap(4096);
    string::new(&mut heap, "garbage before").unwrap();
    let s = string::new(&mut heap, "vm stack survivor").unwrap();
    let old_offset = s.offset();

    let values = Arc::new(Mutex::new(vec![Value::string(s)]));
    heap.add_hook(Box::new(StackHook {
        values: values.clone(),
    }));

    heap.collect(CollectKind::Full);

    let value = values.lock()[0];
    assert_ne!(value.offset(), old_offset);
    assert_eq!(string::as_str(&heap, value.offset()), "vm stack survivor");
}

#[test]
fn interned_names_dedup_and_survive() {
    let mut heap = test_heap(4096);
    let names = heap.add_root(&name::NAME_TYPE);

    let foo = name::intern(&mut heap, names, "foo").unwrap();
    let bar = name::intern(&mut heap, names, "bar").unwrap();
    assert_eq!(name::id(&heap, foo.offset()), 1);
    assert_eq!(name::id(&heap, bar.offset()), 2);
    assert_eq!(name::intern(&mut heap, names, "foo").unwrap(), foo);

    string::new(&mut heap, "garbage").unwrap();
    heap.collect(CollectKind::Full);

    let foo = name::intern(&mut heap, names, "foo").unwrap();
    assert_eq!(name::id(&heap, foo.offset()), 1);
    assert_eq!(name::as_str(&heap, foo.offset()), "foo");
    let baz = name::intern(&mut heap, names, "baz").unwrap();
    assert_eq!(name::id(&heap, baz.offset()), 3);
}

#[test]
fn runtime_roots_survive_collections() {
    let mut heap = test_heap(8192);
    let names = heap.add_root(&name::NAME_TYPE);
    let globals = heap.add_root(&frame::FRAME_TYPE);
    let compiling = heap.add_root(&compile::COMPILE_TYPE);

    frame::push(&mut heap, globals, 4).unwrap();
    name::intern(&mut heap, names, "main").unwrap();
    name::intern(&mut heap, names, "print").unwrap();

    let state = compile::new(&mut heap).unwrap();
    heap.set_root(compiling, state);
    let bytecode = code::new(&mut heap, &[1, 2, 3, 4, 5]).unwrap();
    let state_addr = heap.root(compiling).offset();
    compile::set_code(&mut heap, state_addr, bytecode);

    let f = func::new(&mut heap, bytecode, 2).unwrap();
    let frame_addr = heap.root(globals).offset();
    frame::set_var(&mut heap, frame_addr, 0, Value::func(f));
    frame::set_var(&mut heap, frame_addr, 1, Value::float(6.5));

    string::new(&mut heap, "garbage between the roots").unwrap();
    heap.collect(CollectKind::Full);
    heap.collect(CollectKind::Full);

    let frame_addr = heap.root(globals).offset();
    let f = frame::get_var(&heap, frame_addr, 0);
    assert_eq!(f.kind(), Kind::Func);
    let f = f.offset();
    assert_eq!(func::nformal(&heap, f), 2);
    assert_eq!(code::bytes(&heap, func::code(&heap, f).offset()), [1, 2, 3, 4, 5]);
    assert_eq!(frame::get_var(&heap, frame_addr, 1).as_f32(), Some(6.5));

    // the compiler state and the function share the same code block
    let in_flight = compile::code(&heap, heap.root(compiling).offset());
    assert_eq!(in_flight, func::code(&heap, f));

    let print = name::intern(&mut heap, names, "print").unwrap();
    assert_eq!(name::id(&heap, print.offset()), 2);

    frame::pop(&mut heap, globals);
    assert!(heap.root(globals).is_null());
}

#[test]
fn repeated_full_collects_are_idempotent() {
    // a two-entry window makes every pass fill with stationary objects the
    // second time around, exercising the nothing-moves restart
    let mut heap = Heap::new(HeapOptions {
        pool_size: 4096,
        chunk_window: Some(2),
        ..Default::default()
    });
    let root = heap.add_root(&list::LIST_TYPE);
    let l = list::new(&mut heap, 0).unwrap();
    heap.set_root(root, l);
    for at in 0..5u16 {
        string::new(&mut heap, "filler").unwrap();
        let s = string::new(&mut heap, &format!("item {}", at)).unwrap();
        let l = heap.root(root);
        let l = list::push(&mut heap, l, Value::string(s)).unwrap();
        heap.set_root(root, l);
    }

    heap.collect(CollectKind::Full);
    let top = heap.top();
    let addr = heap.root(root).offset();
    let offsets: Vec<u32> = (0..5u16)
        .map(|at| list::get(&heap, addr, at).offset())
        .collect();

    heap.collect(CollectKind::Full);
    assert_eq!(heap.top(), top);
    let addr = heap.root(root).offset();
    for at in 0..5u16 {
        let value = list::get(&heap, addr, at);
        assert_eq!(value.offset(), offsets[at as usize]);
        assert_eq!(string::as_str(&heap, value.offset()), format!("item {}", at));
    }
}

#[test]
fn chunk_window_option_is_clamped() {
    for entries in [Some(0), Some(usize::MAX)] {
        let mut heap = Heap::new(HeapOptions {
            pool_size: 256,
            chunk_window: entries,
            ..Default::default()
        });
        let s = string::new(&mut heap, "survives any window").unwrap();
        heap.stash(Value::string(s));
        string::new(&mut heap, "garbage").unwrap();
        heap.collect(CollectKind::Full);
        let fetched = heap.fetch();
        assert_eq!(string::as_str(&heap, fetched.offset()), "survives any window");
        assert_eq!(heap.top(), 24);
    }
}

#[test]
fn statistics_report() {
    let mut heap = test_heap(4096);
    let s = string::new(&mut heap, "stat").unwrap();
    heap.stash(Value::string(s));
    heap.collect(CollectKind::Full);

    let stats = heap.statistics();
    assert_eq!(stats.top, 8);
    assert_eq!(stats.last_top, 8);
    assert_eq!(stats.free, 4096 - 8);
    assert_eq!(stats.total_collections, 1);
    assert_eq!(stats.full_collections, 1);
    assert!(stats.to_string().contains("Heap statistics"));
}

#[test]
fn global_heap_round_trip() {
    crate::global::init(HeapOptions {
        pool_size: 1024,
        ..Default::default()
    });
    crate::global::with(|heap| {
        let s = string::new(heap, "global").unwrap();
        heap.stash(Value::string(s));
        heap.collect(CollectKind::Full);
        let fetched = heap.fetch();
        assert_eq!(string::as_str(heap, fetched.offset()), "global");
    });
    crate::global::reset();
}

#[test]
fn static_pool_contract_matches() {
    let mem: &'static mut [u8] = Box::leak(vec![0u8; 2048].into_boxed_slice());
    let mut heap = Heap::with_static(
        mem,
        HeapOptions {
            pool_size: 2048,
            ..Default::default()
        },
    );
    let s = string::new(&mut heap, "static pool").unwrap();
    heap.stash(Value::string(s));
    string::new(&mut heap, "garbage").unwrap();
    heap.collect(CollectKind::Full);
    let fetched_offset = heap.fetch().offset();
    assert_eq!(string::as_str(&heap, fetched_offset), "static pool");
}
