//! IGMPv3 membership report parsing (RFC 3376 §4.2), cross-checked against
//! the field layout used by a production IGMPv3 implementation: a report is
//! an 8-byte fixed header followed by `number_of_group_records` group
//! records, each an 8-byte fixed header followed by `number_of_sources`
//! source addresses and `aux_data_len` 32-bit words of auxiliary data.

use std::net::Ipv4Addr;

use byteorder::{BigEndian, ByteOrder};

use crate::config::{IGMP_MEMBERSHIP_REPORT_V3, IGMP_RECORD_HEADER_LEN, IGMP_REPORT_HEADER_LEN};

/// IGMPv3 group record types (RFC 3376 §4.2.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    ModeIsInclude,
    ModeIsExclude,
    ChangeToIncludeMode,
    ChangeToExcludeMode,
    AllowNewSources,
    BlockOldSources,
    Unknown(u8),
}

impl RecordType {
    fn from_u8(v: u8) -> Self {
        match v {
            0x01 => RecordType::ModeIsInclude,
            0x02 => RecordType::ModeIsExclude,
            0x03 => RecordType::ChangeToIncludeMode,
            0x04 => RecordType::ChangeToExcludeMode,
            0x05 => RecordType::AllowNewSources,
            0x06 => RecordType::BlockOldSources,
            other => RecordType::Unknown(other),
        }
    }
}

/// One parsed group record's fixed fields; source addresses and auxiliary
/// data are skipped over rather than retained (the debounce logic in
/// `listener` only ever interprets zero-source records).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRecord {
    pub record_type: RecordType,
    pub number_of_sources: u16,
    pub multicast_address: Ipv4Addr,
}

/// Computes the IPv4 header length in bytes from the first octet's IHL
/// nibble, and validates that the buffer is at least that long.
pub fn ipv4_header_len(buf: &[u8]) -> Option<usize> {
    let first = *buf.first()?;
    let len = ((first & 0x0F) as usize) * 4;
    if len < 20 || buf.len() < len {
        None
    } else {
        Some(len)
    }
}

/// Reads the IPv4 source address out of an IPv4 header (bytes 12..16).
pub fn ipv4_source(header: &[u8]) -> Option<Ipv4Addr> {
    if header.len() < 16 {
        return None;
    }
    Some(Ipv4Addr::new(header[12], header[13], header[14], header[15]))
}

/// Checks the byte at the start of `payload` against the IGMPv3 membership
/// report type and returns the group record iterator if it matches.
pub fn parse_membership_report(payload: &[u8]) -> Option<GroupRecordIter<'_>> {
    if payload.len() < IGMP_REPORT_HEADER_LEN {
        return None;
    }
    if payload[0] != IGMP_MEMBERSHIP_REPORT_V3 {
        return None;
    }
    let number_of_group_records = BigEndian::read_u16(&payload[6..8]);
    Some(GroupRecordIter {
        buf: &payload[IGMP_REPORT_HEADER_LEN..],
        pos: 0,
        remaining: number_of_group_records,
    })
}

/// Walks group records in a membership report, computing each record's
/// stride from its own `number_of_sources`/`aux_data_len` fields rather than
/// assuming a fixed size, so records with sources are skipped correctly
/// instead of desynchronizing the rest of the scan.
pub struct GroupRecordIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: u16,
}

impl<'a> Iterator for GroupRecordIter<'a> {
    type Item = GroupRecord;

    fn next(&mut self) -> Option<GroupRecord> {
        if self.remaining == 0 {
            return None;
        }
        if self.buf.len() < self.pos + IGMP_RECORD_HEADER_LEN {
            self.remaining = 0;
            return None;
        }
        let record = &self.buf[self.pos..];
        let record_type = RecordType::from_u8(record[0]);
        let aux_data_len = record[1] as usize;
        let number_of_sources = BigEndian::read_u16(&record[2..4]);
        let multicast_address = Ipv4Addr::new(record[4], record[5], record[6], record[7]);

        let stride = IGMP_RECORD_HEADER_LEN + 4 * number_of_sources as usize + 4 * aux_data_len;
        if self.buf.len() < self.pos + stride {
            self.remaining = 0;
            return None;
        }

        self.pos += stride;
        self.remaining -= 1;

        Some(GroupRecord {
            record_type,
            number_of_sources,
            multicast_address,
        })
    }
}
