// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, info, warn};

use crate::{
    client::session::{Session, SessionState},
    error::{IscsiError, Result},
    models::{
        async_msg::response::{AsyncEvent, AsyncMessage},
        data::sense_data::SenseData,
        data_format::PduWithData,
    },
};

impl Session {
    pub(crate) fn handle_async_message(&mut self, pdu: PduWithData<AsyncMessage>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let event = hdr.event();
        match event {
            AsyncEvent::ScsiAsyncEvent => {
                let sense = SenseData::from_response_segment(&pdu.data);
                info!(
                    lun = hdr.lun.get(),
                    asc_ascq = ?sense.as_ref().map(SenseData::asc_ascq),
                    "SCSI asynchronous event"
                );
            },
            AsyncEvent::LogoutRequested => {
                info!(within_secs = hdr.parameter3.get(), "target requested logout");
                if self.state == SessionState::FullFeature {
                    self.logout()?;
                }
            },
            AsyncEvent::ConnectionDrop | AsyncEvent::SessionDrop => {
                warn!(
                    ?event,
                    time2wait = hdr.parameter2.get(),
                    time2retain = hdr.parameter3.get(),
                    "target is dropping the connection"
                );
                return Err(IscsiError::ConnectionLost);
            },
            AsyncEvent::Renegotiate => {
                warn!("target asked for renegotiation; not supported, ignored");
            },
            AsyncEvent::VendorSpecific | AsyncEvent::Reserved(_) => {
                debug!(?event, vcode = hdr.async_vcode, "async message ignored");
            },
        }
        Ok(())
    }
}
