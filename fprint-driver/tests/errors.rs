mod common;

use std::time::Duration;

use fprint_driver::DriverError;
use fprint_protocol::command_table::Opcode;

#[tokio::test]
async fn a_full_command_queue_reports_busy() {
    let mut config = common::test_config();
    config.command_queue_capacity = 1;
    config.enqueue_wait = Duration::from_millis(50);
    let mut h = common::spawn_with(config);
    let driver_a = h.driver.clone();
    let driver_b = h.driver.clone();

    // Occupy the only queue slot and leave it unanswered.
    let first = tokio::spawn(async move { driver_a.count().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = driver_b.count().await;
    assert!(matches!(second, Err(DriverError::Busy)));

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::ValidTemplateNum as u8));
    h.respond_ack(0x00, &[0x00, 0x01]);
    first
        .await
        .expect("count task panicked")
        .expect("the first in-flight count should still complete");
}

#[tokio::test]
async fn an_unanswered_command_times_out() {
    let mut config = common::test_config();
    config.steps.count = Duration::from_millis(50);
    let mut h = common::spawn_with(config);
    let driver = h.driver.clone();
    let count = tokio::spawn(async move { driver.count().await });

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::ValidTemplateNum as u8));
    // Deliberately never reply.

    let err = count
        .await
        .expect("count task panicked")
        .expect_err("an unanswered command should time out");
    assert!(matches!(err, DriverError::Timeout));
}
