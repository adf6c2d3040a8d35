use std::cell::RefCell;
use std::rc::Rc;

use crate::core::buffer::{Buffer, BufferProc, BufferRef, BufferRole, Capacity};
use crate::core::entity::{Batch, Entity, Item};
use crate::error::SimError;
use crate::kernel::engine::{Ctx, Engine};
use crate::kernel::process::{Process, Step};
use crate::kernel::signal::Cond;

fn engine_with_buffer(cap: Capacity) -> (Engine, BufferRef) {
    let mut engine = Engine::new();
    let buf = Buffer::new(&mut engine.ctx, "test", BufferRole::In, cap);
    engine.spawn(Box::new(BufferProc::new(buf.clone())));
    (engine, buf)
}

#[test]
fn test_level_and_fullness_track_the_queue() {
    // Capacity 2: two items fill it, removing one frees it.
    let (mut engine, buf) = engine_with_buffer(Capacity::Finite(2));

    {
        let mut b = buf.borrow_mut();
        b.enqueue(Item::Entity(Entity::new()));
        b.request_transact(&mut engine.ctx);
        b.enqueue(Item::Entity(Entity::new()));
        b.request_transact(&mut engine.ctx);
    }
    engine.run(None).unwrap();
    assert_eq!(buf.borrow().level(), 2);
    assert!(buf.borrow().is_full());

    {
        let mut b = buf.borrow_mut();
        b.dequeue().unwrap();
        b.request_transact(&mut engine.ctx);
    }
    engine.run(None).unwrap();
    assert_eq!(buf.borrow().level(), 1);
    assert!(!buf.borrow().is_full());
}

#[test]
fn test_unbounded_buffer_never_reports_full() {
    let (mut engine, buf) = engine_with_buffer(Capacity::Unbounded);

    {
        let mut b = buf.borrow_mut();
        for _ in 0..100 {
            b.enqueue(Item::Entity(Entity::new()));
        }
        b.request_transact(&mut engine.ctx);
    }
    engine.run(None).unwrap();
    assert_eq!(buf.borrow().level(), 100);
    assert!(!buf.borrow().is_full());
}

#[test]
fn test_expanded_count_counts_leaves_not_slots() {
    let (mut engine, buf) = engine_with_buffer(Capacity::Finite(4));

    {
        let mut b = buf.borrow_mut();
        b.enqueue(Item::Entity(Entity::new()));
        b.enqueue(Item::Batch(Batch::new(vec![
            Item::Entity(Entity::new()),
            Item::Entity(Entity::new()),
            Item::Entity(Entity::new()),
        ])));
        b.request_transact(&mut engine.ctx);
    }
    engine.run(None).unwrap();

    // A batch occupies one slot but expands to its leaf entities.
    assert_eq!(buf.borrow().level(), 2);
    assert_eq!(buf.borrow().expanded_count(), 4);
}

/// Mutates the queue once, transacts, and records its wake-up.
struct Mutator {
    name: String,
    buf: BufferRef,
    wakes: Rc<RefCell<Vec<u32>>>,
    tag: u32,
    transacted: bool,
}

impl Process for Mutator {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        if !self.transacted {
            self.transacted = true;
            let mut b = self.buf.borrow_mut();
            b.enqueue(Item::Entity(Entity::new()));
            b.request_transact(ctx);
            return Ok(Step::Wait(b.txn_done, Cond::Truthy));
        }
        self.wakes.borrow_mut().push(self.tag);
        Ok(Step::Done)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[test]
fn test_back_to_back_transacts_each_get_one_wakeup_in_order() {
    // Two mutators transact before the buffer process runs at all; neither
    // wake-up may be lost and they must arrive in transact order.
    let (mut engine, buf) = engine_with_buffer(Capacity::Finite(10));
    let wakes = Rc::new(RefCell::new(Vec::new()));

    for tag in [1, 2] {
        engine.spawn(Box::new(Mutator {
            name: format!("mutator_{}", tag),
            buf: buf.clone(),
            wakes: wakes.clone(),
            tag,
            transacted: false,
        }));
    }

    engine.run(None).unwrap();
    assert_eq!(*wakes.borrow(), vec![1, 2]);
    assert_eq!(buf.borrow().level(), 2);
}
