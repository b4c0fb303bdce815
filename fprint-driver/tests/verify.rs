mod common;

use fprint_protocol::command_table::Opcode;

#[tokio::test]
async fn verify_happy_path_returns_the_match() {
    let mut h = common::spawn();
    let driver = h.driver.clone();
    let verify = tokio::spawn(async move { driver.verify().await });

    h.driver.finger_sink().notify();
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GenChar as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::Search as u8));
    h.respond_ack(0x00, &[0x00, 0x02, 0x00, 0x32]);

    let info = verify
        .await
        .expect("verify task panicked")
        .expect("verify should have found a match");
    assert_eq!(info.page_id, 2);
    assert_eq!(info.template_id, 2);
    assert_eq!(info.score, 50);
}

#[tokio::test]
async fn verify_reports_no_match() {
    let mut config = common::test_config();
    config.steps.verify_attempts = 1;
    let mut h = common::spawn_with(config);
    let driver = h.driver.clone();
    let verify = tokio::spawn(async move { driver.verify().await });

    h.driver.finger_sink().notify();
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GenChar as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::Search as u8));
    h.respond_ack(0x09, &[]); // NOT_FOUND

    let err = verify
        .await
        .expect("verify task panicked")
        .expect_err("an empty database should report no match");
    assert!(matches!(err, fprint_driver::DriverError::NotFound));
}
