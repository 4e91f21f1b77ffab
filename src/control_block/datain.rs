// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed decoding of data-in payloads, keyed by the CDB that produced them.

use crate::{
    control_block::{
        inquiry::{
            BlockLimits, DeviceIdDescriptor, INQUIRY, InquiryStandard, VpdPage,
            parse_inquiry_standard, parse_vpd_block_limits, parse_vpd_device_id,
            parse_vpd_supported_pages, parse_vpd_unit_serial,
        },
        mod_sense::{MODE_SENSE_6, MODE_SENSE_10, ModeSense, parse_mode_sense6, parse_mode_sense10},
        persistent_reservation::{
            PERSISTENT_RESERVE_IN, PrInAction, PrReadKeys, PrReadReservation,
            parse_pr_read_keys, parse_pr_read_reservation,
        },
        read_capacity::{
            READ_CAPACITY_10, ReadCapacity10, ReadCapacity16, SA_READ_CAPACITY_16,
            SERVICE_ACTION_IN_16, parse_read_capacity10, parse_read_capacity16,
        },
        report_luns::{REPORT_LUNS, ReportLuns, parse_report_luns},
        request_sense::REQUEST_SENSE,
    },
    error::DataInError,
    models::data::sense_data::SenseData,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataIn {
    ReadCapacity10(ReadCapacity10),
    ReadCapacity16(ReadCapacity16),
    Inquiry(Box<InquiryStandard>),
    SupportedVpdPages(Vec<u8>),
    UnitSerial(String),
    DeviceIdentification(Vec<DeviceIdDescriptor>),
    BlockLimits(Box<BlockLimits>),
    ModeSense(Box<ModeSense>),
    ReportLuns(ReportLuns),
    Sense(Box<SenseData>),
    PrKeys(PrReadKeys),
    PrReservation(PrReadReservation),
}

/// Decodes `data` according to the operation code (and service action or
/// VPD page) in `cdb`. Commands without a decoder yield
/// [`DataInError::Unsupported`].
pub fn unmarshal_datain(cdb: &[u8], data: &[u8]) -> Result<DataIn, DataInError> {
    let Some(&opcode) = cdb.first() else {
        return Err(DataInError::Invalid("empty CDB".into()));
    };
    let byte = |i: usize| cdb.get(i).copied().unwrap_or(0);

    Ok(match opcode {
        READ_CAPACITY_10 => DataIn::ReadCapacity10(parse_read_capacity10(data)?),
        SERVICE_ACTION_IN_16 if byte(1) & 0x1F == SA_READ_CAPACITY_16 => {
            DataIn::ReadCapacity16(parse_read_capacity16(data)?)
        },
        INQUIRY if byte(1) & 0x01 == 0 => DataIn::Inquiry(Box::new(parse_inquiry_standard(data)?)),
        INQUIRY => match VpdPage::try_from(byte(2))? {
            VpdPage::SupportedPages => DataIn::SupportedVpdPages(parse_vpd_supported_pages(data)?),
            VpdPage::UnitSerial => DataIn::UnitSerial(parse_vpd_unit_serial(data)?),
            VpdPage::DeviceId => DataIn::DeviceIdentification(parse_vpd_device_id(data)?),
            VpdPage::BlockLimits => DataIn::BlockLimits(Box::new(parse_vpd_block_limits(data)?)),
        },
        MODE_SENSE_6 => DataIn::ModeSense(Box::new(parse_mode_sense6(data)?)),
        MODE_SENSE_10 => DataIn::ModeSense(Box::new(parse_mode_sense10(data)?)),
        REPORT_LUNS => DataIn::ReportLuns(parse_report_luns(data)?),
        REQUEST_SENSE => DataIn::Sense(Box::new(SenseData::parse(data))),
        PERSISTENT_RESERVE_IN if byte(1) & 0x1F == PrInAction::ReadKeys as u8 => {
            DataIn::PrKeys(parse_pr_read_keys(data)?)
        },
        PERSISTENT_RESERVE_IN if byte(1) & 0x1F == PrInAction::ReadReservation as u8 => {
            DataIn::PrReservation(parse_pr_read_reservation(data)?)
        },
        other => return Err(DataInError::Unsupported(other)),
    })
}
