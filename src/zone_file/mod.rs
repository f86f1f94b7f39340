// Copyright 2024 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The binary zone snapshot format.
//!
//! Zones are persisted one file per zone, `<lowercase name>.zone` (the
//! root zone as `.zone`), holding magic `"DZ"`, a version octet, and a
//! version-dependent body:
//!
//! * **v2**: a record count followed by that many bare records; the
//!   zone kind is inferred from the SOA.
//! * **v3**: a leading zone-disabled flag, then a record count and
//!   records each followed by a metadata tag blob.
//! * **v4**: a full zone-info blob (name, kind, flags, DNSSEC status,
//!   transfer/notify/update policies, timestamps, primary servers, and
//!   opaque key material) before the tagged records.
//!
//! The reader accepts all three versions (v2 and v3 remain for legacy
//! migration); the writer always emits v4.

use std::convert::TryFrom;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::class::Class;
use crate::dnssec::{DnssecStatus, ZoneKey};
use crate::name::Name;
use crate::rr::{
    helpers, GenericInfo, NsInfo, RdataBuf, Record, RecordInfo, SerialScheme, SoaInfo, SvcbInfo,
    Ttl, Type,
};
use crate::zone::{NotifyPolicy, TransferPolicy, UpdatePolicy, ZoneInfo, ZoneKind};

/// The two magic octets opening every zone file.
const MAGIC: [u8; 2] = *b"DZ";

/// The snapshot version the writer emits.
const CURRENT_VERSION: u8 = 4;

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors reading or writing zone snapshots.
#[derive(Debug)]
pub enum Error {
    /// The file does not start with the `DZ` magic.
    InvalidMagic,

    /// The file's version octet is not one we understand.
    UnsupportedVersion(u8),

    /// The file's structure is inconsistent.
    Corrupt(&'static str),

    /// An underlying I/O failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidMagic => f.write_str("not a zone file (bad magic)"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported zone file version {}", version)
            }
            Self::Corrupt(what) => write!(f, "corrupt zone file: {}", what),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// THE SNAPSHOT STRUCTURE                                             //
////////////////////////////////////////////////////////////////////////

/// The deserialized content of one zone snapshot.
#[derive(Debug)]
pub struct ZoneFile {
    pub info: ZoneInfo,
    pub primaries: Vec<SocketAddr>,
    pub keys: Vec<ZoneKey>,
    pub records: Vec<Record>,
}

/// Returns the file name a zone is stored under: the lowercase zone
/// name (without its trailing dot) plus `.zone`. The root zone is
/// stored as `.zone`.
pub fn file_name(zone: &Name) -> String {
    if zone.is_root() {
        return ".zone".to_owned();
    }
    let mut name = zone.to_string().to_ascii_lowercase();
    name.push_str("zone");
    name
}

////////////////////////////////////////////////////////////////////////
// READING                                                            //
////////////////////////////////////////////////////////////////////////

/// Reads a zone snapshot of any supported version.
pub fn read(mut reader: impl Read) -> Result<ZoneFile> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::InvalidMagic);
    }
    match read_u8(&mut reader)? {
        2 => read_v2(reader),
        3 => read_v3(reader),
        4 => read_v4(reader),
        version => Err(Error::UnsupportedVersion(version)),
    }
}

fn read_v2(mut reader: impl Read) -> Result<ZoneFile> {
    let count = read_u32(&mut reader)?;
    let mut records = Vec::with_capacity(count.min(0x10000) as usize);
    for _ in 0..count {
        records.push(read_record(&mut reader, false)?);
    }
    let info = infer_info(&records)?;
    Ok(ZoneFile {
        info,
        primaries: Vec::new(),
        keys: Vec::new(),
        records,
    })
}

fn read_v3(mut reader: impl Read) -> Result<ZoneFile> {
    let disabled = read_u8(&mut reader)? != 0;
    let count = read_u32(&mut reader)?;
    let mut records = Vec::with_capacity(count.min(0x10000) as usize);
    for _ in 0..count {
        records.push(read_record(&mut reader, true)?);
    }
    let mut info = infer_info(&records)?;
    info.disabled = disabled;
    Ok(ZoneFile {
        info,
        primaries: Vec::new(),
        keys: Vec::new(),
        records,
    })
}

fn read_v4(mut reader: impl Read) -> Result<ZoneFile> {
    let name = read_name(&mut reader)?;
    let kind = match read_u8(&mut reader)? {
        0 => ZoneKind::Primary,
        1 => ZoneKind::Secondary,
        2 => ZoneKind::Stub,
        3 => ZoneKind::Forwarder,
        _ => return Err(Error::Corrupt("unknown zone kind")),
    };
    let disabled = read_u8(&mut reader)? != 0;
    let dnssec = match read_u8(&mut reader)? {
        0 => DnssecStatus::Unsigned,
        1 => DnssecStatus::SignedWithNsec,
        2 => DnssecStatus::SignedWithNsec3,
        _ => return Err(Error::Corrupt("unknown DNSSEC status")),
    };
    let transfer_policy = match read_policy(&mut reader)? {
        (0, _) => TransferPolicy::Deny,
        (1, _) => TransferPolicy::Allow,
        (2, addrs) => TransferPolicy::AllowSpecified(addrs),
        _ => return Err(Error::Corrupt("unknown transfer policy")),
    };
    let notify_policy = match read_policy(&mut reader)? {
        (0, _) => NotifyPolicy::Disabled,
        (1, _) => NotifyPolicy::ZoneNameServers,
        (2, addrs) => NotifyPolicy::Specified(addrs),
        _ => return Err(Error::Corrupt("unknown notify policy")),
    };
    let update_policy = match read_policy(&mut reader)? {
        (0, _) => UpdatePolicy::Deny,
        (1, _) => UpdatePolicy::Allow,
        (2, addrs) => UpdatePolicy::AllowSpecified(addrs),
        _ => return Err(Error::Corrupt("unknown update policy")),
    };
    let last_modified = UNIX_EPOCH + Duration::from_secs(read_u64(&mut reader)?);
    let primaries = read_addr_list(&mut reader)?;

    let key_count = read_u16(&mut reader)?;
    let mut keys = Vec::with_capacity(key_count as usize);
    for _ in 0..key_count {
        keys.push(read_key(&mut reader)?);
    }

    let count = read_u32(&mut reader)?;
    let mut records = Vec::with_capacity(count.min(0x10000) as usize);
    for _ in 0..count {
        records.push(read_record(&mut reader, true)?);
    }

    Ok(ZoneFile {
        info: ZoneInfo {
            name,
            kind,
            disabled,
            internal: false,
            dnssec,
            transfer_policy,
            notify_policy,
            update_policy,
            last_modified,
        },
        primaries,
        keys,
        records,
    })
}

/// Synthesizes zone metadata for legacy (v2/v3) snapshots, which carry
/// none. The kind is inferred from the SOA: a zone whose SOA MNAME
/// matches one of its own NS targets is a primary, any other zone with
/// an SOA is a secondary, and a zone without an SOA is a forwarder
/// shell.
fn infer_info(records: &[Record]) -> Result<ZoneInfo> {
    let soa = records.iter().find(|record| record.rr_type == Type::SOA);
    let Some(soa) = soa else {
        let name = records
            .first()
            .map(|record| record.owner.clone())
            .ok_or(Error::Corrupt("empty legacy zone file"))?;
        return Ok(ZoneInfo::new(name, ZoneKind::Forwarder));
    };

    let name = soa.owner.clone();
    let fields =
        helpers::SoaFields::read(&soa.rdata).ok_or(Error::Corrupt("malformed SOA record"))?;
    let is_primary = records
        .iter()
        .filter(|record| record.rr_type == Type::NS && record.owner == name)
        .filter_map(|record| helpers::read_name(&record.rdata, 0))
        .any(|target| target.as_ref() == fields.mname.as_ref());
    let kind = if is_primary || !records.iter().any(|r| r.rr_type == Type::NS) {
        ZoneKind::Primary
    } else {
        ZoneKind::Secondary
    };
    Ok(ZoneInfo::new(name, kind))
}

fn read_record(reader: &mut impl Read, with_tag: bool) -> Result<Record> {
    let owner = read_name(reader)?;
    let rr_type = Type::from(read_u16(reader)?);
    let class = Class::from(read_u16(reader)?);
    let ttl = Ttl::from(read_u32(reader)?);
    let rdata_len = read_u16(reader)? as usize;
    let mut rdata = vec![0u8; rdata_len];
    reader.read_exact(&mut rdata)?;
    let rdata = RdataBuf::try_from(rdata).map_err(|_| Error::Corrupt("oversized RDATA"))?;

    let info = if with_tag {
        read_tag(reader)?.unwrap_or_else(|| RecordInfo::for_type(rr_type))
    } else {
        RecordInfo::for_type(rr_type)
    };
    Ok(Record::with_info(owner, rr_type, class, ttl, rdata, info))
}

fn read_tag(reader: &mut impl Read) -> Result<Option<RecordInfo>> {
    if read_u8(reader)? == 0 {
        return Ok(None);
    }
    let variant = read_u8(reader)?;
    let common = GenericInfo {
        disabled: read_u8(reader)? != 0,
        comments: read_string(reader)?,
        last_used: match read_u64(reader)? {
            0 => None,
            secs => Some(UNIX_EPOCH + Duration::from_secs(secs)),
        },
    };
    let info = match variant {
        0 => RecordInfo::Generic(common),
        1 => {
            let glue_count = read_u16(reader)?;
            let mut glue = Vec::with_capacity(glue_count as usize);
            for _ in 0..glue_count {
                glue.push(read_record(reader, true)?);
            }
            RecordInfo::Ns(NsInfo { common, glue })
        }
        2 => {
            let serial_scheme = match read_u8(reader)? {
                0 => SerialScheme::Increment,
                1 => SerialScheme::Date,
                _ => return Err(Error::Corrupt("unknown serial scheme")),
            };
            RecordInfo::Soa(SoaInfo {
                common,
                serial_scheme,
            })
        }
        3 => RecordInfo::Svcb(SvcbInfo {
            common,
            auto_ipv4_hint: read_u8(reader)? != 0,
            auto_ipv6_hint: read_u8(reader)? != 0,
        }),
        _ => return Err(Error::Corrupt("unknown record tag variant")),
    };
    Ok(Some(info))
}

fn read_key(reader: &mut impl Read) -> Result<ZoneKey> {
    let tag = read_u16(reader)?;
    let algorithm = read_u8(reader)?;
    let flags = read_u16(reader)?;
    let public_len = read_u16(reader)? as usize;
    let mut public = vec![0u8; public_len];
    reader.read_exact(&mut public)?;
    let secret_len = read_u32(reader)? as usize;
    if secret_len > 0x100000 {
        return Err(Error::Corrupt("oversized key material"));
    }
    let mut secret = vec![0u8; secret_len];
    reader.read_exact(&mut secret)?;
    let retired = read_u8(reader)? != 0;
    Ok(ZoneKey {
        tag,
        algorithm,
        flags,
        public_rdata: RdataBuf::try_from(public).map_err(|_| Error::Corrupt("oversized key"))?,
        secret,
        retired,
    })
}

////////////////////////////////////////////////////////////////////////
// WRITING                                                            //
////////////////////////////////////////////////////////////////////////

/// Writes a zone snapshot in the current (v4) format.
pub fn write(mut writer: impl Write, file: &ZoneFile) -> Result<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CURRENT_VERSION])?;

    write_name(&mut writer, &file.info.name)?;
    let kind = match file.info.kind {
        ZoneKind::Primary => 0u8,
        ZoneKind::Secondary => 1,
        ZoneKind::Stub => 2,
        ZoneKind::Forwarder => 3,
    };
    writer.write_all(&[kind, file.info.disabled as u8])?;
    let dnssec = match file.info.dnssec {
        DnssecStatus::Unsigned => 0u8,
        DnssecStatus::SignedWithNsec => 1,
        DnssecStatus::SignedWithNsec3 => 2,
    };
    writer.write_all(&[dnssec])?;

    match &file.info.transfer_policy {
        TransferPolicy::Deny => write_policy(&mut writer, 0, &[])?,
        TransferPolicy::Allow => write_policy(&mut writer, 1, &[])?,
        TransferPolicy::AllowSpecified(addrs) => write_policy(&mut writer, 2, addrs)?,
    }
    match &file.info.notify_policy {
        NotifyPolicy::Disabled => write_policy(&mut writer, 0, &[])?,
        NotifyPolicy::ZoneNameServers => write_policy(&mut writer, 1, &[])?,
        NotifyPolicy::Specified(addrs) => write_policy(&mut writer, 2, addrs)?,
    }
    match &file.info.update_policy {
        UpdatePolicy::Deny => write_policy(&mut writer, 0, &[])?,
        UpdatePolicy::Allow => write_policy(&mut writer, 1, &[])?,
        UpdatePolicy::AllowSpecified(addrs) => write_policy(&mut writer, 2, addrs)?,
    }

    let modified = file
        .info
        .last_modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    writer.write_all(&modified.to_be_bytes())?;
    write_addr_list(&mut writer, &file.primaries)?;

    writer.write_all(&(file.keys.len() as u16).to_be_bytes())?;
    for key in &file.keys {
        write_key(&mut writer, key)?;
    }

    writer.write_all(&(file.records.len() as u32).to_be_bytes())?;
    for record in &file.records {
        write_record(&mut writer, record)?;
    }
    Ok(())
}

fn write_record(writer: &mut impl Write, record: &Record) -> Result<()> {
    write_name(writer, &record.owner)?;
    writer.write_all(&u16::from(record.rr_type).to_be_bytes())?;
    writer.write_all(&u16::from(record.class).to_be_bytes())?;
    writer.write_all(&u32::from(record.ttl).to_be_bytes())?;
    writer.write_all(&(record.rdata.octets().len() as u16).to_be_bytes())?;
    writer.write_all(record.rdata.octets())?;
    write_tag(writer, &record.info)
}

fn write_tag(writer: &mut impl Write, info: &RecordInfo) -> Result<()> {
    writer.write_all(&[1])?;
    let variant = match info {
        RecordInfo::Generic(_) => 0u8,
        RecordInfo::Ns(_) => 1,
        RecordInfo::Soa(_) => 2,
        RecordInfo::Svcb(_) => 3,
    };
    writer.write_all(&[variant])?;

    let common = info.common();
    writer.write_all(&[common.disabled as u8])?;
    write_string(writer, common.comments.as_deref())?;
    let last_used = common
        .last_used
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    writer.write_all(&last_used.to_be_bytes())?;

    match info {
        RecordInfo::Generic(_) => (),
        RecordInfo::Ns(ns) => {
            writer.write_all(&(ns.glue.len() as u16).to_be_bytes())?;
            for glue in &ns.glue {
                write_record(writer, glue)?;
            }
        }
        RecordInfo::Soa(soa) => {
            let scheme = match soa.serial_scheme {
                SerialScheme::Increment => 0u8,
                SerialScheme::Date => 1,
            };
            writer.write_all(&[scheme])?;
        }
        RecordInfo::Svcb(svcb) => {
            writer.write_all(&[svcb.auto_ipv4_hint as u8, svcb.auto_ipv6_hint as u8])?;
        }
    }
    Ok(())
}

fn write_key(writer: &mut impl Write, key: &ZoneKey) -> Result<()> {
    writer.write_all(&key.tag.to_be_bytes())?;
    writer.write_all(&[key.algorithm])?;
    writer.write_all(&key.flags.to_be_bytes())?;
    writer.write_all(&(key.public_rdata.octets().len() as u16).to_be_bytes())?;
    writer.write_all(key.public_rdata.octets())?;
    writer.write_all(&(key.secret.len() as u32).to_be_bytes())?;
    writer.write_all(&key.secret)?;
    writer.write_all(&[key.retired as u8])?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// PRIMITIVE CODECS                                                   //
////////////////////////////////////////////////////////////////////////

fn read_u8(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads an uncompressed wire-format name, label by label.
fn read_name(reader: &mut impl Read) -> Result<Box<Name>> {
    let mut wire = Vec::new();
    loop {
        let len = read_u8(reader)?;
        wire.push(len);
        if len == 0 {
            break;
        }
        if wire.len() + len as usize > 255 {
            return Err(Error::Corrupt("oversized name"));
        }
        let start = wire.len();
        wire.resize(start + len as usize, 0);
        reader.read_exact(&mut wire[start..])?;
    }
    Name::try_from_uncompressed_all(&wire).map_err(|_| Error::Corrupt("malformed name"))
}

fn write_name(writer: &mut impl Write, name: &Name) -> Result<()> {
    writer.write_all(name.wire_repr())?;
    Ok(())
}

/// Reads an optional length-prefixed UTF-8 string (zero length means
/// absent).
fn read_string(reader: &mut impl Read) -> Result<Option<String>> {
    let len = read_u16(reader)? as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| Error::Corrupt("non-UTF-8 string"))
}

fn write_string(writer: &mut impl Write, value: Option<&str>) -> Result<()> {
    let value = value.unwrap_or("");
    writer.write_all(&(value.len() as u16).to_be_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_policy(reader: &mut impl Read) -> Result<(u8, Vec<SocketAddr>)> {
    let tag = read_u8(reader)?;
    let addrs = if tag == 2 {
        read_addr_list(reader)?
    } else {
        Vec::new()
    };
    Ok((tag, addrs))
}

fn write_policy(writer: &mut impl Write, tag: u8, addrs: &[SocketAddr]) -> Result<()> {
    writer.write_all(&[tag])?;
    if tag == 2 {
        write_addr_list(writer, addrs)?;
    }
    Ok(())
}

fn read_addr_list(reader: &mut impl Read) -> Result<Vec<SocketAddr>> {
    let count = read_u8(reader)?;
    let mut addrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let text = read_string(reader)?.ok_or(Error::Corrupt("empty address"))?;
        addrs.push(
            text.parse()
                .map_err(|_| Error::Corrupt("malformed address"))?,
        );
    }
    Ok(addrs)
}

fn write_addr_list(writer: &mut impl Write, addrs: &[SocketAddr]) -> Result<()> {
    writer.write_all(&[addrs.len() as u8])?;
    for addr in addrs {
        write_string(writer, Some(&addr.to_string()))?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::helpers::SoaFields;
    use crate::rr::Serial;

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn soa_record() -> Record {
        let fields = SoaFields {
            mname: "ns1.example.com.".parse().unwrap(),
            rname: "hostmaster.example.com.".parse().unwrap(),
            serial: Serial::from(42),
            refresh: 900,
            retry: 300,
            expire: 604800,
            minimum: 3600,
        };
        let mut record = Record::new(
            boxed_name("example.com."),
            Type::SOA,
            Class::IN,
            Ttl::from(3600),
            fields.to_rdata(),
        );
        record.info = RecordInfo::Soa(SoaInfo {
            common: GenericInfo {
                disabled: false,
                comments: Some("registry SOA".to_owned()),
                last_used: None,
            },
            serial_scheme: SerialScheme::Date,
        });
        record
    }

    fn sample_file() -> ZoneFile {
        let glue = Record::new(
            boxed_name("ns1.sub.example.com."),
            Type::A,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(&[198u8, 51, 100, 1][..]).unwrap(),
        );
        let ns = Record::with_info(
            boxed_name("sub.example.com."),
            Type::NS,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(boxed_name("ns1.sub.example.com.").wire_repr()).unwrap(),
            RecordInfo::Ns(NsInfo {
                common: GenericInfo::default(),
                glue: vec![glue],
            }),
        );
        let mut disabled = Record::new(
            boxed_name("off.example.com."),
            Type::A,
            Class::IN,
            Ttl::from(60),
            RdataBuf::try_from(&[192u8, 0, 2, 66][..]).unwrap(),
        );
        disabled.info.set_disabled(true);

        let mut info = ZoneInfo::new(boxed_name("example.com."), ZoneKind::Primary);
        info.transfer_policy =
            TransferPolicy::AllowSpecified(vec!["192.0.2.1:53".parse().unwrap()]);
        info.dnssec = DnssecStatus::SignedWithNsec;

        ZoneFile {
            info,
            primaries: Vec::new(),
            keys: vec![ZoneKey {
                tag: 12345,
                algorithm: 13,
                flags: 257,
                public_rdata: RdataBuf::try_from(&[1u8, 1, 3, 13, 9, 9][..]).unwrap(),
                secret: vec![0xde, 0xad, 0xbe, 0xef],
                retired: false,
            }],
            records: vec![soa_record(), ns, disabled],
        }
    }

    #[test]
    fn v4_round_trips() {
        let file = sample_file();
        let mut buf = Vec::new();
        write(&mut buf, &file).unwrap();
        let read_back = read(&buf[..]).unwrap();

        assert_eq!(read_back.info.name, file.info.name);
        assert_eq!(read_back.info.kind, ZoneKind::Primary);
        assert_eq!(read_back.info.dnssec, DnssecStatus::SignedWithNsec);
        assert_eq!(read_back.info.transfer_policy, file.info.transfer_policy);
        assert_eq!(read_back.keys.len(), 1);
        assert_eq!(read_back.keys[0].secret, [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(read_back.records.len(), 3);

        // Tag metadata survives: the SOA serial scheme, the NS glue,
        // and the disabled flag.
        assert_eq!(
            read_back.records[0].info.serial_scheme(),
            SerialScheme::Date
        );
        assert_eq!(
            read_back.records[0].info.common().comments.as_deref(),
            Some("registry SOA")
        );
        assert_eq!(read_back.records[1].info.glue().len(), 1);
        assert!(read_back.records[2].is_disabled());
    }

    #[test]
    fn v2_files_are_accepted_and_kind_inferred() {
        // A hand-built v2 file: magic, version, count, bare records.
        let mut buf = Vec::new();
        buf.extend_from_slice(b"DZ");
        buf.push(2);
        let soa = soa_record();
        let mut ns = Record::new(
            boxed_name("example.com."),
            Type::NS,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(boxed_name("ns1.example.com.").wire_repr()).unwrap(),
        );
        ns.info = RecordInfo::for_type(Type::NS);
        buf.extend_from_slice(&2u32.to_be_bytes());
        for record in [&soa, &ns] {
            buf.extend_from_slice(record.owner.wire_repr());
            buf.extend_from_slice(&u16::from(record.rr_type).to_be_bytes());
            buf.extend_from_slice(&u16::from(record.class).to_be_bytes());
            buf.extend_from_slice(&u32::from(record.ttl).to_be_bytes());
            buf.extend_from_slice(&(record.rdata.octets().len() as u16).to_be_bytes());
            buf.extend_from_slice(record.rdata.octets());
        }

        let file = read(&buf[..]).unwrap();
        // The SOA MNAME matches the NS target, so this is a primary.
        assert_eq!(file.info.kind, ZoneKind::Primary);
        assert_eq!(file.info.name, boxed_name("example.com."));
        assert_eq!(file.records.len(), 2);
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(matches!(read(&b"XX\x04"[..]), Err(Error::InvalidMagic)));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        assert!(matches!(
            read(&b"DZ\x07"[..]),
            Err(Error::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn file_names_are_lowercase() {
        assert_eq!(
            file_name(&boxed_name("Example.COM.")),
            "example.com.zone"
        );
        assert_eq!(file_name(Name::root()), ".zone");
    }
}
