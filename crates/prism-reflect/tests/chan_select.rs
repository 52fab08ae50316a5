//! Channel and Select Tests
//!
//! Channel operations across threads:
//! - Blocking send and receive between threads
//! - Closed channel semantics for receive, send and close
//! - Select with ready cases, default cases and nil channels
//! - Fairness among simultaneously ready cases
//!
//! # Running Tests
//! ```bash
//! cargo test -p prism-reflect --test chan_select
//! ```

use prism_reflect::runtime::types::{chan_of, INT, STRING};
use prism_reflect::runtime::{ChanDir, RuntimeError, Type};
use prism_reflect::{make_chan, select, zero, ReflectError, SelectCase, SelectDir, Value};
use std::thread;
use std::time::Duration;

fn int_chan() -> &'static Type {
    chan_of(ChanDir::Both, &INT)
}

// ===== Send and Receive =====

#[test]
fn test_unbuffered_rendezvous() {
    let c = make_chan(int_chan(), 0).unwrap();
    let sender = thread::spawn(move || {
        for i in 0..10isize {
            c.send(Value::of(i)).unwrap();
        }
        c.close().unwrap();
    });

    let mut got = Vec::new();
    loop {
        let (v, ok) = c.recv().unwrap();
        if !ok {
            break;
        }
        got.push(v.int().unwrap());
    }
    sender.join().unwrap();
    assert_eq!(got, (0..10).collect::<Vec<i64>>());
}

#[test]
fn test_try_ops_on_full_and_empty() {
    let c = make_chan(int_chan(), 1).unwrap();
    let (v, ok) = c.try_recv().unwrap();
    assert!(!v.is_valid());
    assert!(!ok);

    assert!(c.try_send(Value::of(1isize)).unwrap());
    assert!(!c.try_send(Value::of(2isize)).unwrap());
    assert_eq!((c.len().unwrap(), c.cap().unwrap()), (1, 1));

    let (v, ok) = c.try_recv().unwrap();
    assert!(ok);
    assert_eq!(v.int().unwrap(), 1);
}

#[test]
fn test_send_converts_to_element_type() {
    let c = make_chan(int_chan(), 1).unwrap();
    assert!(matches!(
        c.send(Value::from("x")),
        Err(ReflectError::NotAssignableTo { .. })
    ));
    assert_eq!(c.len().unwrap(), 0);
}

#[test]
fn test_strings_cross_threads() {
    let c = make_chan(chan_of(ChanDir::Both, &STRING), 4).unwrap();
    let producer = thread::spawn(move || {
        for word in ["a", "bb", "ccc"] {
            c.send(Value::from(word)).unwrap();
        }
    });
    producer.join().unwrap();
    let words: Vec<String> = (0..3).map(|_| c.recv().unwrap().0.to_string()).collect();
    assert_eq!(words, ["a", "bb", "ccc"]);
}

#[test]
fn test_fan_in_from_scoped_producers() {
    let c = make_chan(int_chan(), 8).unwrap();
    let total = crossbeam::thread::scope(|s| {
        for p in 0..4isize {
            s.spawn(move |_| {
                for i in 0..25isize {
                    c.send(Value::of(p * 100 + i)).unwrap();
                }
            });
        }
        (0..100)
            .map(|_| c.recv().unwrap().0.int().unwrap())
            .sum::<i64>()
    })
    .unwrap();
    let expected: i64 = (0..4).map(|p| (0..25).map(|i| p * 100 + i).sum::<i64>()).sum();
    assert_eq!(total, expected);
}

// ===== Closed Channels =====

#[test]
fn test_closed_channel_drains_then_yields_zero() {
    let c = make_chan(int_chan(), 3).unwrap();
    c.send(Value::of(4isize)).unwrap();
    c.close().unwrap();

    let (v, ok) = c.recv().unwrap();
    assert!(ok);
    assert_eq!(v.int().unwrap(), 4);
    for _ in 0..3 {
        let (v, ok) = c.try_recv().unwrap();
        assert!(!ok);
        assert!(v.is_valid());
        assert_eq!(v.int().unwrap(), 0);
    }
}

#[test]
fn test_send_on_closed_channel() {
    let c = make_chan(int_chan(), 1).unwrap();
    c.close().unwrap();
    assert_eq!(
        c.send(Value::of(1isize)).unwrap_err(),
        ReflectError::Runtime(RuntimeError::SendOnClosed)
    );
    assert_eq!(
        c.close().unwrap_err(),
        ReflectError::Runtime(RuntimeError::CloseOfClosed)
    );
}

#[test]
fn test_close_wakes_blocked_receiver() {
    let c = make_chan(int_chan(), 0).unwrap();
    let receiver = thread::spawn(move || c.recv().unwrap().1);
    thread::sleep(Duration::from_millis(20));
    c.close().unwrap();
    assert!(!receiver.join().unwrap());
}

#[test]
fn test_close_receive_only_channel() {
    let c = zero(chan_of(ChanDir::Recv, &INT));
    assert_eq!(
        c.close().unwrap_err(),
        ReflectError::WrongChannelDirection {
            method: "Value::close",
            dir: ChanDir::Recv
        }
    );
}

// ===== Select =====

#[test]
fn test_select_prefers_ready_case_over_default() {
    let c = make_chan(int_chan(), 1).unwrap();
    c.send(Value::of(42isize)).unwrap();

    let cases = [SelectCase::recv(c), SelectCase::default_case()];
    let (chosen, v, ok) = select(&cases).unwrap();
    assert_eq!(chosen, 0);
    assert!(ok);
    assert_eq!(v.int().unwrap(), 42);
}

#[test]
fn test_select_default_when_nothing_ready() {
    let c = make_chan(int_chan(), 0).unwrap();
    let cases = [
        SelectCase::recv(c),
        SelectCase::send(c, Value::of(1isize)),
        SelectCase::default_case(),
    ];
    let (chosen, v, ok) = select(&cases).unwrap();
    assert_eq!(chosen, 2);
    assert_eq!(cases[chosen].dir, SelectDir::Default);
    assert!(!v.is_valid());
    assert!(!ok);
}

#[test]
fn test_select_nil_channel_cases_never_fire() {
    let nil = zero(int_chan());
    let live = make_chan(int_chan(), 1).unwrap();
    let cases = [
        SelectCase::recv(nil),
        SelectCase::send(nil, Value::of(1isize)),
        SelectCase::recv(Value::INVALID),
        SelectCase::send(live, Value::of(9isize)),
    ];
    for _ in 0..20 {
        let (chosen, _, _) = select(&cases).unwrap();
        assert_eq!(chosen, 3);
        live.recv().unwrap();
    }
}

#[test]
fn test_select_send_delivers_value() {
    let c = make_chan(int_chan(), 1).unwrap();
    let (chosen, v, _) = select(&[SelectCase::send(c, Value::of(5isize))]).unwrap();
    assert_eq!(chosen, 0);
    assert!(!v.is_valid());
    assert_eq!(c.recv().unwrap().0.int().unwrap(), 5);
}

#[test]
fn test_select_receives_closed() {
    let c = make_chan(int_chan(), 0).unwrap();
    c.close().unwrap();
    let (chosen, v, ok) = select(&[SelectCase::recv(c)]).unwrap();
    assert_eq!(chosen, 0);
    assert!(!ok);
    assert_eq!(v.int().unwrap(), 0);
}

#[test]
fn test_select_closed_send_faults_only_when_chosen() {
    let closed = make_chan(int_chan(), 1).unwrap();
    closed.close().unwrap();
    let ready = make_chan(int_chan(), 1).unwrap();
    let cases = [
        SelectCase::send(closed, Value::of(1isize)),
        SelectCase::recv(ready),
    ];

    let (mut faults, mut received) = (0, 0);
    for _ in 0..200 {
        ready.try_send(Value::of(3isize)).unwrap();
        match select(&cases) {
            Err(e) => {
                assert_eq!(e, ReflectError::Runtime(RuntimeError::SendOnClosed));
                faults += 1;
            }
            Ok((chosen, v, ok)) => {
                assert_eq!((chosen, ok), (1, true));
                assert_eq!(v.int().unwrap(), 3);
                received += 1;
            }
        }
    }
    assert!(faults > 0);
    assert!(received > 0);
}

#[test]
fn test_select_blocks_until_sender_arrives() {
    let a = make_chan(int_chan(), 0).unwrap();
    let b = make_chan(int_chan(), 0).unwrap();
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        b.send(Value::of(7isize)).unwrap();
    });
    let (chosen, v, ok) = select(&[SelectCase::recv(a), SelectCase::recv(b)]).unwrap();
    sender.join().unwrap();
    assert_eq!(chosen, 1);
    assert!(ok);
    assert_eq!(v.int().unwrap(), 7);
}

#[test]
fn test_select_picks_among_ready_cases() {
    let a = make_chan(int_chan(), 1).unwrap();
    let b = make_chan(int_chan(), 1).unwrap();
    let mut hits = [0usize; 2];
    for _ in 0..400 {
        a.try_send(Value::of(1isize)).unwrap();
        b.try_send(Value::of(2isize)).unwrap();
        let (chosen, _, _) = select(&[SelectCase::recv(a), SelectCase::recv(b)]).unwrap();
        hits[chosen] += 1;
        // Drain whichever is still full
        let _ = a.try_recv().unwrap();
        let _ = b.try_recv().unwrap();
    }
    assert!(hits[0] > 50, "case 0 chosen {} times", hits[0]);
    assert!(hits[1] > 50, "case 1 chosen {} times", hits[1]);
}

#[test]
fn test_select_rejects_malformed_cases() {
    let c = make_chan(chan_of(ChanDir::Recv, &INT), 0);
    assert!(c.is_err());

    let send_only = zero(chan_of(ChanDir::Send, &INT));
    assert!(matches!(
        select(&[SelectCase::recv(send_only)]),
        Err(ReflectError::InvalidSelectCase { index: 0, .. })
    ));

    let mut bad = SelectCase::recv(make_chan(int_chan(), 0).unwrap());
    bad.send = Value::of(1isize);
    assert!(matches!(
        select(&[SelectCase::default_case(), bad]),
        Err(ReflectError::InvalidSelectCase { index: 1, .. })
    ));
}
