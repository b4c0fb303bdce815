//! Multi-step operations (spec §4.5): `enroll`, `verify`, `delete`,
//! `clear`, `count`, `read_system_parameters`, `backup`, `restore`,
//! `check_exists`, `read_info_page`.

use std::time::{Duration, Instant};

use fprint_protocol::command_table::{
    DELETE_CHAR, DOWN_CHAR, EMPTY_DATABASE, GET_IMAGE, LOAD_CHAR, Opcode, READ_INDEX_TABLE, READ_INFO_PAGE,
    READ_SYS_PARA, REG_MODEL, SEARCH, STORE_CHAR, UP_CHAR, VALID_TEMPLATE_NUM,
};
use fprint_protocol::{
    Event, EventKind, OperationMode, OutcomeBit, Packet, PacketId, StatusContext, StatusOutcome, SysParams,
    TemplateAccumulator, TemplateBuffer,
};

use crate::driver::Driver;
use crate::error::{DriverError, DriverResult};

fn ensure_success(outcome: &StatusOutcome) -> DriverResult<()> {
    if outcome.bits.contains(&OutcomeBit::Success) {
        return Ok(());
    }
    if let Some(EventKind::Error(status)) = outcome.event {
        return Err(DriverError::SensorError { status });
    }
    Err(DriverError::SensorError { status: 0 })
}

impl Driver {
    /// Enroll a fingerprint into `location` (spec §4.5 `Enroll`). Step 2
    /// (occupancy check) is not retried; steps 3–8 get up to
    /// `steps.enroll_attempts` tries.
    pub async fn enroll(&self, location: u16) -> DriverResult<()> {
        self.check_location_free(location).await?;

        let mut last_err = DriverError::Timeout;
        for _ in 0..self.config().steps.enroll_attempts {
            match self.enroll_attempt(location).await {
                Ok(()) => {
                    self.set_operation_mode(OperationMode::None);
                    return Ok(());
                }
                Err(err) => last_err = err,
            }
        }
        self.set_operation_mode(OperationMode::None);
        Err(last_err)
    }

    async fn check_location_free(&self, location: u16) -> DriverResult<()> {
        let page = (location >> 8) as u8;
        let bit = (location & 0xFF) as u8;
        let ctx = StatusContext {
            checking_location: true,
            location_bit: Some(bit),
            ..StatusContext::default()
        };
        let outcome = self
            .sender()
            .dispatch(READ_INDEX_TABLE, &[page], ctx, self.config().steps.index_table_read)
            .await?;
        if outcome.bits.contains(&OutcomeBit::CheckingLocationFail) {
            return Err(DriverError::Occupied { location });
        }
        Ok(())
    }

    async fn enroll_attempt(&self, location: u16) -> DriverResult<()> {
        let ctx = StatusContext {
            enrollment_in_progress: true,
            ..StatusContext::default()
        };

        // `wait_for_finger` only returns `Ok` once the finger-detection
        // task (C6) has both confirmed presence and dispatched the
        // buffer-selected gen-char itself (spec §4.6), so there is no
        // separate gen-char dispatch here.
        self.set_operation_mode(OperationMode::EnrollFirst);
        self.wait_for_finger(self.config().steps.finger_wait).await?;

        self.confirm_finger_removed().await?;

        self.set_operation_mode(OperationMode::EnrollSecond);
        self.wait_for_finger(self.config().steps.finger_wait).await?;

        let outcome = self
            .sender()
            .dispatch(REG_MODEL, &[], StatusContext::default(), self.config().steps.reg_model)
            .await?;
        ensure_success(&outcome)?;

        // score=0 is "no duplicate" even on SUCCESS (spec §4.5 step 7).
        let outcome = self
            .sender()
            .dispatch(SEARCH, &[0x01, 0x00, 0x00, 0x00, 0x64], ctx, self.config().steps.search)
            .await?;
        if let Some(EventKind::SearchSuccess(info)) = outcome.event {
            return Err(DriverError::Duplicate { template_id: info.template_id });
        }
        ensure_success(&outcome)?;

        let page_high = (location >> 8) as u8;
        let page_low = (location & 0xFF) as u8;
        let outcome = self
            .sender()
            .dispatch(
                STORE_CHAR,
                &[0x01, page_high, page_low],
                StatusContext::default(),
                self.config().steps.store_char,
            )
            .await?;
        ensure_success(&outcome)
    }

    /// Require ≥2 consecutive no-finger get-image replies within the
    /// configured window (spec §4.5 step 4).
    async fn confirm_finger_removed(&self) -> DriverResult<()> {
        let deadline = Instant::now() + self.config().steps.no_finger_confirm_window;
        let mut consecutive_absent = 0u32;
        while Instant::now() < deadline {
            let outcome = self
                .sender()
                .dispatch(GET_IMAGE, &[], StatusContext::default(), Duration::from_millis(500))
                .await;
            match outcome {
                Ok(o) if !o.bits.contains(&OutcomeBit::Success) => {
                    consecutive_absent += 1;
                    if consecutive_absent >= 2 {
                        return Ok(());
                    }
                }
                _ => consecutive_absent = 0,
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err(DriverError::Timeout)
    }

    /// Confirm a fingerprint against the whole database (spec §4.5
    /// `Verify`). Up to `steps.verify_attempts` tries.
    pub async fn verify(&self) -> DriverResult<fprint_protocol::MatchInfo> {
        self.state().reset_match_cooldown();
        self.set_operation_mode(OperationMode::Verify);

        let mut last_err = DriverError::NotFound;
        for _ in 0..self.config().steps.verify_attempts {
            self.wait_for_finger(self.config().steps.finger_wait).await?;
            let ctx = StatusContext::default();
            let outcome = self
                .sender()
                .dispatch(SEARCH, &[0x01, 0x00, 0x00, 0x00, 0x64], ctx, self.config().steps.verify_search)
                .await?;
            match outcome.event {
                Some(EventKind::SearchSuccess(info)) => {
                    self.set_operation_mode(OperationMode::None);
                    return Ok(info);
                }
                Some(EventKind::SearchFail) => last_err = DriverError::NotFound,
                _ => {}
            }
        }
        self.set_operation_mode(OperationMode::None);
        Err(last_err)
    }

    /// Issue `delete-char` for one location (spec §4.5 `Delete`).
    pub async fn delete(&self, location: u16) -> DriverResult<()> {
        let page_high = (location >> 8) as u8;
        let page_low = (location & 0xFF) as u8;
        let outcome = self
            .sender()
            .dispatch(
                DELETE_CHAR,
                &[page_high, page_low, 0x00, 0x01],
                StatusContext::default(),
                self.config().steps.delete,
            )
            .await?;
        ensure_success(&outcome)
    }

    /// Wipe the whole on-sensor database (spec §4.5 `Clear`).
    pub async fn clear_database(&self) -> DriverResult<()> {
        let outcome = self
            .sender()
            .dispatch(EMPTY_DATABASE, &[], StatusContext::default(), self.config().steps.clear)
            .await?;
        ensure_success(&outcome)
    }

    /// Number of enrolled templates (spec §4.5 `Count`).
    pub async fn count(&self) -> DriverResult<u16> {
        let outcome = self
            .sender()
            .dispatch(VALID_TEMPLATE_NUM, &[], StatusContext::default(), self.config().steps.count)
            .await?;
        match outcome.event {
            Some(EventKind::TemplateCount(count)) => Ok(count),
            _ => ensure_success(&outcome).map(|()| 0),
        }
    }

    /// Read the 16-byte system parameters block (spec §4.5
    /// `read_system_parameters`).
    pub async fn read_system_parameters(&self) -> DriverResult<SysParams> {
        let outcome = self
            .sender()
            .dispatch(READ_SYS_PARA, &[], StatusContext::default(), self.config().steps.count)
            .await?;
        match outcome.event {
            Some(EventKind::SysParamsRead(params)) => Ok(params),
            _ => Err(DriverError::SensorError { status: 0 }),
        }
    }

    /// Download a template from `id` (spec §4.5 `Backup`).
    pub async fn backup(&self, id: u16) -> DriverResult<TemplateBuffer> {
        let page_high = (id >> 8) as u8;
        let page_low = (id & 0xFF) as u8;
        self.sender()
            .dispatch(
                LOAD_CHAR,
                &[0x01, page_high, page_low],
                StatusContext::default(),
                self.config().steps.store_char,
            )
            .await?;
        self.sender()
            .dispatch(UP_CHAR, &[0x01], StatusContext::default(), self.config().steps.reg_model)
            .await?;
        self.accumulate_template().await
    }

    /// Upload `bytes` into `id` (spec §4.5 `Restore`): chunk into 128-byte
    /// `Data` packets with a final `EndData`, appending an empty
    /// `EndData` when the payload is an exact multiple of the chunk size.
    pub async fn restore(&self, id: u16, bytes: &[u8]) -> DriverResult<()> {
        const CHUNK: usize = 128;

        self.sender()
            .dispatch(DOWN_CHAR, &[0x01], StatusContext::default(), self.config().steps.reg_model)
            .await?;

        let opcode = Opcode::DownChar as u8;
        let address = self.sender().address();
        let chunks: Vec<&[u8]> = bytes.chunks(CHUNK).collect();

        if chunks.is_empty() {
            self.send_chunk(address, opcode, PacketId::EndData, &[]).await?;
        } else {
            for (i, chunk) in chunks.iter().enumerate() {
                let packet_id = if i + 1 == chunks.len() { PacketId::EndData } else { PacketId::Data };
                self.send_chunk(address, opcode, packet_id, chunk).await?;
            }
            if bytes.len() % CHUNK == 0 {
                self.send_chunk(address, opcode, PacketId::EndData, &[]).await?;
            }
        }

        let page_high = (id >> 8) as u8;
        let page_low = (id & 0xFF) as u8;
        let outcome = self
            .sender()
            .dispatch(
                STORE_CHAR,
                &[0x01, page_high, page_low],
                StatusContext::default(),
                self.config().steps.store_char,
            )
            .await?;
        ensure_success(&outcome)
    }

    async fn send_chunk(&self, address: u32, opcode: u8, packet_id: PacketId, bytes: &[u8]) -> DriverResult<()> {
        let packet = Packet::new(address, packet_id, None, bytes.to_vec());
        let outcome = self
            .sender()
            .dispatch_raw(packet, opcode, StatusContext::default(), self.config().steps.reg_model)
            .await?;
        ensure_success(&outcome)
    }

    /// Whether a template already occupies `id` (spec §4.5
    /// `Check-template-exists`): prefer the index-table bit, fall back to
    /// `load-char` (a non-error ACK means present).
    pub async fn check_exists(&self, id: u16) -> DriverResult<bool> {
        let page = (id >> 8) as u8;
        let bit = (id & 0xFF) as u8;
        let ctx = StatusContext {
            checking_location: true,
            location_bit: Some(bit),
            ..StatusContext::default()
        };
        if let Ok(outcome) = self
            .sender()
            .dispatch(READ_INDEX_TABLE, &[page], ctx, self.config().steps.index_table_read)
            .await
        {
            if outcome.bits.contains(&OutcomeBit::CheckingLocationFail) {
                return Ok(true);
            }
            if outcome.bits.contains(&OutcomeBit::CheckingLocationSuccess) {
                return Ok(false);
            }
        }

        let page_high = page;
        let page_low = bit;
        let outcome = self
            .sender()
            .dispatch(
                LOAD_CHAR,
                &[0x01, page_high, page_low],
                StatusContext::default(),
                self.config().steps.store_char,
            )
            .await?;
        Ok(outcome.bits.contains(&OutcomeBit::Success))
    }

    /// Read the sensor's info page (spec §4.5 `Read-info-page`): up to 32
    /// `Data` packets terminated by an `EndData`.
    pub async fn read_info_page(&self) -> DriverResult<TemplateBuffer> {
        self.sender()
            .dispatch(READ_INFO_PAGE, &[], StatusContext::default(), self.config().steps.reg_model)
            .await?;
        self.accumulate_template().await
    }

    async fn accumulate_template(&self) -> DriverResult<TemplateBuffer> {
        let mut accumulator = TemplateAccumulator::new(self.sender().address());
        let started = Instant::now();
        loop {
            let response = tokio::time::timeout(Duration::from_secs(5), self.recv_template())
                .await
                .map_err(|_| DriverError::Timeout)?
                .ok_or(DriverError::TransportClosed)?;
            for packet in response.packets {
                accumulator.push(packet);
            }
            if accumulator.is_complete(started.elapsed()) {
                break;
            }
        }
        let buffer = accumulator.finish(started.elapsed());

        // Publish completion via the event bus (spec §4.7 "deep-copy the
        // accumulator into an Event payload ... publish via the event
        // bus"). There is no in-flight command to correlate this with, so
        // the causing packet is a placeholder.
        self.events().trigger(Event {
            kind: EventKind::TemplateUploaded(buffer.clone()),
            status: 0x00,
            opcode: Opcode::UpChar as u8,
            packet: Packet::new(self.sender().address(), PacketId::EndData, None, Vec::new()),
        });

        Ok(buffer)
    }
}
