mod common;

use std::sync::{Arc, Mutex};

use fprint_protocol::command_table::Opcode;
use fprint_protocol::{EventKind, PacketId};

#[tokio::test]
async fn backup_accumulates_the_uploaded_template() {
    let mut h = common::spawn();

    let uploaded = Arc::new(Mutex::new(None));
    h.driver.set_event_handler({
        let uploaded = uploaded.clone();
        move |event| {
            if let EventKind::TemplateUploaded(buffer) = event.kind {
                *uploaded.lock().unwrap() = Some(buffer);
            }
        }
    });

    let driver = h.driver.clone();
    let backup = tokio::spawn(async move { driver.backup(7).await });

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::LoadChar as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::UpChar as u8));
    h.respond_ack(0x00, &[]);

    h.respond_data(&[0xAA; 10]);
    h.respond_end_data(&[0xBB; 5]);

    let buffer = backup
        .await
        .expect("backup task panicked")
        .expect("backup should have completed");
    assert!(buffer.is_complete);
    let mut expected = vec![0xAA; 10];
    expected.extend(vec![0xBB; 5]);
    assert_eq!(buffer.data, expected);

    let published = uploaded.lock().unwrap().clone().expect("TemplateUploaded should have been published");
    assert_eq!(published, buffer);
}

#[tokio::test]
async fn restore_chunks_the_payload_and_stores_it() {
    let mut h = common::spawn();
    let driver = h.driver.clone();
    let bytes: Vec<u8> = (0..200).map(|i| i as u8).collect();
    let restore = tokio::spawn({
        let bytes = bytes.clone();
        async move { driver.restore(3, &bytes).await }
    });

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::DownChar as u8));
    h.respond_ack(0x00, &[]);

    // 200 bytes -> one 128-byte `Data` chunk, one 72-byte `EndData` chunk.
    let cmd = h.next_command().await;
    assert_eq!(cmd.packet_id, PacketId::Data);
    assert_eq!(cmd.parameters.len(), 128);
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.packet_id, PacketId::EndData);
    assert_eq!(cmd.parameters.len(), 72);
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::StoreChar as u8));
    h.respond_ack(0x00, &[]);

    restore
        .await
        .expect("restore task panicked")
        .expect("restore should have completed");
}

#[tokio::test]
async fn restore_appends_an_empty_end_data_for_an_exact_multiple() {
    let mut h = common::spawn();
    let driver = h.driver.clone();
    let bytes = vec![0x42u8; 256]; // exactly 2 * 128-byte chunks
    let restore = tokio::spawn({
        let bytes = bytes.clone();
        async move { driver.restore(4, &bytes).await }
    });

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::DownChar as u8));
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.packet_id, PacketId::Data);
    assert_eq!(cmd.parameters.len(), 128);
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.packet_id, PacketId::EndData);
    assert_eq!(cmd.parameters.len(), 128);
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.packet_id, PacketId::EndData);
    assert!(cmd.parameters.is_empty());
    h.respond_ack(0x00, &[]);

    let cmd = h.next_command().await;
    assert_eq!(cmd.code, Some(Opcode::StoreChar as u8));
    h.respond_ack(0x00, &[]);

    restore
        .await
        .expect("restore task panicked")
        .expect("restore should have completed");
}
