//! CCID3接收端的行为测试：反馈条件与选项生成。
//! Behavioral tests for the CCID3 receiver: feedback conditions and
//! option emission.

use crate::cc::{CcSignal, ReceiverCongestionControl};
use crate::packet::options::{
    OPTION_ELAPSED_TIME, OPTION_LOSS_INTERVALS, OPTION_RECEIVE_RATE,
};
use crate::packet::{FeedforwardHeader, PacketType, PreHeader};

use super::diff_window_counter;
use super::receiver::Receiver;

const FALLBACK: i64 = 100_000_000;

fn open_receiver() -> Receiver {
    let r = Receiver::new(FALLBACK);
    r.open();
    r
}

fn data(seq: i64, time: i64, ccval: i8) -> FeedforwardHeader {
    FeedforwardHeader {
        ptype: PacketType::Data,
        seq_no: seq,
        ccval,
        time,
        data_len: 100,
        options: vec![],
    }
}

fn ack(ack_no: i64, time: i64) -> PreHeader {
    PreHeader {
        ptype: PacketType::Ack,
        seq_no: 0,
        ack_no,
        ccval: 0,
        time,
    }
}

#[test]
fn window_counter_distance_is_circular() {
    assert_eq!(diff_window_counter(4, 0), 4);
    assert_eq!(diff_window_counter(0, 4), 12);
    assert_eq!(diff_window_counter(2, 14), 4);
    assert_eq!(diff_window_counter(14, 2), 12);
    assert_eq!(diff_window_counter(7, 7), 0);
    assert_eq!(diff_window_counter(0, 15), 1);
}

#[test]
fn condition_one_needs_data_and_an_elapsed_roundtrip() {
    let r = open_receiver();

    // No data yet: idle never asks for feedback.
    assert_eq!(r.on_idle(1_000_000_000), None);

    // A write stamps last_write; data arrives afterwards.
    r.on_write(&ack(0, 1_000_000_000));
    r.on_read(&data(1, 1_020_000_000, 0));

    // Less than one (fallback) roundtrip since the last write: nothing.
    assert_eq!(r.on_idle(1_050_000_000), None);
    // More than one roundtrip and data pending: feedback now.
    assert_eq!(r.on_idle(1_300_000_000), Some(CcSignal::AckNow));

    // Sending the Ack clears the data flag; idle goes quiet again.
    r.on_write(&ack(1, 1_300_000_000));
    assert_eq!(r.on_idle(1_600_000_000), None);
}

#[test]
fn condition_two_fires_while_loss_rate_exceeds_last_report() {
    let r = open_receiver();
    let mut t = 0;
    for seq in 1..=10 {
        t += 1_000_000;
        assert_eq!(r.on_read(&data(seq, t, 0)), None);
    }

    // Sequence 11 lost; 12 makes the loss detectable.
    let verdict = r.on_read(&data(12, t + 1_000_000, 0));
    assert_eq!(verdict, Some(CcSignal::AckNow));

    // Feedback goes out; the reported rate is latched.
    r.on_write(&ack(12, t + 2_000_000));

    // The event does not grow, so no further condition-II feedback.
    assert_eq!(r.on_read(&data(13, t + 3_000_000, 0)), None);
}

#[test]
fn loss_spike_fires_condition_two_at_each_detection() {
    let r = open_receiver();
    let mut t = 0;
    for seq in 1..=20 {
        t += 1_000_000;
        assert_eq!(r.on_read(&data(seq, t, 0)), None);
    }

    // A spike: every other packet lost, events spread wider than the
    // roundtrip so each is its own loss event.
    for seq in [22, 24, 26] {
        t += 3 * FALLBACK;
        let verdict = r.on_read(&data(seq, t, 0));
        assert_eq!(verdict, Some(CcSignal::AckNow), "seq {seq}");
        // The connection answers each signal with an Ack.
        r.on_write(&ack(seq, t + 1_000_000));
    }
}

#[test]
fn condition_three_triggers_at_window_counter_distance_four() {
    let r = open_receiver();
    let mut t = 1_000_000;
    let mut seq = 0;

    // Establish a feedback baseline at ccval 14.
    seq += 1;
    r.on_read(&data(seq, t, 14));
    t += 1_000_000;
    r.on_write(&ack(seq, t));

    // Distance 3 forward from 14 is 1: no feedback.
    seq += 1;
    t += 1_000_000;
    assert_eq!(r.on_read(&data(seq, t, 1)), None);
    t += 1_000_000;
    r.on_write(&ack(seq, t));

    // Distance 4 forward from 1 is 5: feedback, across the wrap too.
    seq += 1;
    t += 1_000_000;
    assert_eq!(r.on_read(&data(seq, t, 5)), Some(CcSignal::AckNow));
}

#[test]
fn condition_three_ignores_non_data_packets() {
    let r = open_receiver();
    r.on_read(&data(1, 1_000_000, 0));
    r.on_write(&ack(1, 2_000_000));

    let sync = FeedforwardHeader {
        ptype: PacketType::Sync,
        seq_no: 2,
        ccval: 9,
        time: 3_000_000,
        data_len: 0,
        options: vec![],
    };
    assert_eq!(r.on_read(&sync), None);
}

#[test]
fn ack_with_packets_seen_emits_exactly_three_options_in_order() {
    let r = open_receiver();
    r.on_read(&data(1, 1_000_000, 0));
    let opts = r.on_write(&ack(1, 2_000_000));
    assert_eq!(opts.len(), 3);
    assert_eq!(opts[0].kind, OPTION_ELAPSED_TIME);
    assert_eq!(opts[1].kind, OPTION_RECEIVE_RATE);
    assert_eq!(opts[2].kind, OPTION_LOSS_INTERVALS);
}

#[test]
fn ack_before_any_packet_emits_no_options() {
    let r = open_receiver();
    assert!(r.on_write(&ack(0, 1_000_000)).is_empty());
}

#[test]
fn data_writes_emit_no_options() {
    let r = open_receiver();
    r.on_read(&data(1, 1_000_000, 0));
    let ph = PreHeader {
        ptype: PacketType::Data,
        seq_no: 5,
        ack_no: 0,
        ccval: 0,
        time: 2_000_000,
    };
    assert!(r.on_write(&ph).is_empty());
}

#[test]
#[should_panic(expected = "ack_no")]
fn ack_number_must_equal_gsr() {
    let r = open_receiver();
    r.on_read(&data(5, 1_000_000, 0));
    r.on_write(&ack(4, 2_000_000));
}

#[test]
#[should_panic(expected = "opening an open ccid3 receiver")]
fn double_open_is_a_programming_error() {
    let r = open_receiver();
    r.open();
}

#[test]
fn closed_receiver_is_inert() {
    let r = open_receiver();
    r.close();
    r.close(); // idempotent

    assert_eq!(r.on_read(&data(1, 1_000_000, 0)), None);
    assert!(r.on_write(&ack(1, 2_000_000)).is_empty());
    assert_eq!(r.on_idle(10_000_000_000), None);
}

#[test]
fn close_then_open_resets_state() {
    let r = open_receiver();
    r.on_read(&data(9, 1_000_000, 0));
    r.close();
    r.open();
    // After reopening nothing has been seen: no feedback options.
    assert!(r.on_write(&ack(0, 2_000_000)).is_empty());
}
