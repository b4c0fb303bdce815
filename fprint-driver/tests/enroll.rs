mod common;

use fprint_protocol::command_table::Opcode;

#[tokio::test]
async fn enroll_happy_path_stores_the_template() {
    let mut h = common::spawn();
    let driver = h.driver.clone();
    let enroll = tokio::spawn(async move { driver.enroll(5).await });

    // Step 2: occupancy check, location free.
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::ReadIndexTable as u8));
    h.respond_ack(0x00, &[0u8; 32]);

    // Step 3: first capture.
    h.driver.finger_sink().notify();
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GenChar as u8));
    h.respond_ack(0x00, &[]);

    // Step 4: finger removed, two consecutive no-finger replies.
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x02, &[]);
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x02, &[]);

    // Step 5: second capture.
    h.driver.finger_sink().notify();
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GenChar as u8));
    h.respond_ack(0x00, &[]);

    // Step 6: model registration.
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::RegModel as u8));
    h.respond_ack(0x00, &[]);

    // Step 7: duplicate search, score 0 during enrollment is not a match.
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::Search as u8));
    h.respond_ack(0x00, &[0x00, 0x00, 0x00, 0x00]);

    // Step 8: store.
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::StoreChar as u8));
    h.respond_ack(0x00, &[]);

    enroll
        .await
        .expect("enroll task panicked")
        .expect("enroll should have succeeded");
}

#[tokio::test]
async fn enroll_rejects_an_occupied_location() {
    let mut h = common::spawn();
    let driver = h.driver.clone();
    let enroll = tokio::spawn(async move { driver.enroll(5).await });

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::ReadIndexTable as u8));
    let mut bitmap = [0u8; 32];
    bitmap[0] = 0b0010_0000; // bit 5 occupied
    h.respond_ack(0x00, &bitmap);

    let err = enroll
        .await
        .expect("enroll task panicked")
        .expect_err("enroll over an occupied location should fail");
    assert!(matches!(err, fprint_driver::DriverError::Occupied { location: 5 }));
}

#[tokio::test]
async fn enroll_reports_a_duplicate_match() {
    // A single attempt: `enroll` retries on any `enroll_attempt` error,
    // including `Duplicate`, so pin the retry count to isolate the
    // duplicate-detection path from the retry mechanics.
    let mut config = common::test_config();
    config.steps.enroll_attempts = 1;
    let mut h = common::spawn_with(config);
    let driver = h.driver.clone();
    let enroll = tokio::spawn(async move { driver.enroll(9).await });

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::ReadIndexTable as u8));
    h.respond_ack(0x00, &[0u8; 32]);

    h.driver.finger_sink().notify();
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GenChar as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x02, &[]);
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x02, &[]);

    h.driver.finger_sink().notify();
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GetImage as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::GenChar as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::RegModel as u8));
    h.respond_ack(0x00, &[]);

    // A positive score flags the new print as a duplicate of template 3.
    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::Search as u8));
    h.respond_ack(0x00, &[0x00, 0x03, 0x00, 0x32]);

    let err = enroll
        .await
        .expect("enroll task panicked")
        .expect_err("a positive search score should be reported as a duplicate");
    assert!(matches!(err, fprint_driver::DriverError::Duplicate { template_id: 3 }));
}
