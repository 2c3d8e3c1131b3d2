// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_ipu::{
    arbiter::{Arbiter, Role, Slot},
    error::TaskError,
    task::TaskId,
};
use serial_test::serial;
use std::{
    thread,
    time::{Duration, Instant},
};

fn id(n: u64) -> TaskId {
    TaskId::from_sequence(n)
}

#[test]
fn test_general_purpose_slots_first() {
    let arbiter = Arbiter::new(2);
    assert_eq!(arbiter.slots(), 4);

    let a = arbiter.acquire(id(1), false, Duration::ZERO).unwrap();
    let b = arbiter.acquire(id(2), false, Duration::ZERO).unwrap();
    let c = arbiter.acquire(id(3), false, Duration::ZERO).unwrap();
    let d = arbiter.acquire(id(4), false, Duration::ZERO).unwrap();
    let slots: Vec<Slot> = [&a, &b, &c, &d].iter().map(|g| g.slot()).collect();
    assert_eq!(
        slots,
        [
            Slot { unit: 0, role: Role::GeneralPurpose },
            Slot { unit: 1, role: Role::GeneralPurpose },
            Slot { unit: 0, role: Role::Secondary },
            Slot { unit: 1, role: Role::Secondary },
        ]
    );
    assert_eq!(arbiter.occupied(), 4);
    assert_eq!(arbiter.owner(slots[2]), Some(id(3)));
    assert!(arbiter.holds(id(4)));
    assert_eq!(c.slot().to_string(), "ipu0-pp");
}

#[test]
fn test_exhausted_table_times_out() {
    let arbiter = Arbiter::new(1);
    let _a = arbiter.acquire(id(1), false, Duration::ZERO).unwrap();
    let _b = arbiter.acquire(id(2), false, Duration::ZERO).unwrap();

    let start = Instant::now();
    let err = arbiter
        .acquire(id(3), false, Duration::from_millis(30))
        .unwrap_err();
    assert_eq!(err, TaskError::ResourceTimeout);
    assert!(err.is_retryable());
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(arbiter.waiters(), 0);
    assert!(!arbiter.holds(id(3)));
}

#[test]
fn test_deinterlace_takes_general_purpose_only() {
    let arbiter = Arbiter::new(1);
    let gp = arbiter.acquire(id(1), false, Duration::ZERO).unwrap();
    assert_eq!(gp.role(), Role::GeneralPurpose);

    // The secondary slot is free but the deinterlacer cannot use it.
    assert_eq!(
        arbiter.acquire(id(2), true, Duration::ZERO).unwrap_err(),
        TaskError::ResourceTimeout
    );
    let pp = arbiter.acquire(id(3), false, Duration::ZERO).unwrap();
    assert_eq!(pp.role(), Role::Secondary);

    drop(gp);
    let vdi = arbiter.acquire(id(2), true, Duration::ZERO).unwrap();
    assert_eq!(vdi.slot(), Slot { unit: 0, role: Role::GeneralPurpose });
}

#[test]
fn test_guard_releases_on_drop() {
    let arbiter = Arbiter::new(2);
    {
        let _a = arbiter.acquire(id(1), false, Duration::ZERO).unwrap();
        let _b = arbiter.acquire(id(2), true, Duration::ZERO).unwrap();
        assert_eq!(arbiter.occupied(), 2);
    }
    assert_eq!(arbiter.occupied(), 0);
    assert_eq!(arbiter.peak(), 2);
    assert!(!arbiter.holds(id(1)));

    // Unwinding holders release as well.
    let result = thread::scope(|s| {
        s.spawn(|| {
            let _guard = arbiter.acquire(id(3), false, Duration::ZERO).unwrap();
            panic!("holder failed");
        })
        .join()
    });
    assert!(result.is_err());
    assert_eq!(arbiter.occupied(), 0);
}

#[test]
#[serial]
fn test_waiter_wakes_on_release() {
    let arbiter = Arbiter::new(1);
    let a = arbiter.acquire(id(1), false, Duration::ZERO).unwrap();
    let b = arbiter.acquire(id(2), false, Duration::ZERO).unwrap();

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let start = Instant::now();
            let guard = arbiter.acquire(id(3), false, Duration::from_secs(5))?;
            Ok::<_, TaskError>((guard.slot(), start.elapsed()))
        });
        while arbiter.waiters() == 0 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        drop(b);

        let (slot, waited) = waiter.join().unwrap().unwrap();
        assert_eq!(slot, Slot { unit: 0, role: Role::Secondary });
        assert!(waited >= Duration::from_millis(20));
        assert!(waited < Duration::from_secs(5));
    });
    drop(a);
    assert_eq!(arbiter.occupied(), 0);
}

#[test]
#[serial]
fn test_slots_are_never_shared() {
    let arbiter = Arbiter::new(2);
    thread::scope(|s| {
        for n in 0..16 {
            let arbiter = &arbiter;
            s.spawn(move || {
                for round in 0..20 {
                    let task = id(n * 100 + round + 1);
                    let guard = arbiter.acquire(task, n % 3 == 0, Duration::from_secs(5)).unwrap();
                    assert_eq!(arbiter.owner(guard.slot()), Some(task));
                    assert!(arbiter.occupied() <= arbiter.slots());
                    thread::sleep(Duration::from_micros(200));
                    assert_eq!(arbiter.owner(guard.slot()), Some(task));
                }
            });
        }
    });
    assert_eq!(arbiter.occupied(), 0);
    assert!(arbiter.peak() <= 4);
}
