// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM file headers.

An RPM file consists of:

1. A 96 byte *lead*, beginning with the magic `ED AB EE DB`. Only the magic
   and the package type are meaningful today.
2. The *signature header*, padded to a multiple of 8 bytes. It holds digests
   and signatures of the main header (and legacy signatures of the header
   plus payload).
3. The main *header*, holding package metadata such as the name, version
   and dependencies.
4. The compressed payload archive.

Both headers share a structure: a 16 byte intro (`8E AD E8 01`, 4 reserved
bytes, big endian entry count and data size), an index of 16 byte entries
(tag, type, offset, count) and a data store the entries point into.

This module only decodes headers. Verification of the signature header is
performed by [crate::signature] and orchestrated by
[crate::transaction::TransactionSet].
*/

use {
    crate::{
        dependency::{Dependency, DependencyFlags},
        diagnostics::{self, Level},
        error::{BuildDepError, Result},
    },
    std::{collections::BTreeMap, io::Read},
};

/// Magic bytes at the start of every RPM file.
pub const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];

/// Size in bytes of the lead.
pub const LEAD_SIZE: usize = 96;

/// Magic bytes at the start of every header structure.
pub const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

/// Maximum number of index entries in a header.
const HEADER_TAGS_MAX: u32 = 0xffff;

/// Maximum size of a header data store.
const HEADER_DATA_MAX: u32 = 256 * 1024 * 1024;

pub const RPMTAG_NAME: u32 = 1000;
pub const RPMTAG_VERSION: u32 = 1001;
pub const RPMTAG_RELEASE: u32 = 1002;
pub const RPMTAG_EPOCH: u32 = 1003;
pub const RPMTAG_ARCH: u32 = 1022;
pub const RPMTAG_SOURCERPM: u32 = 1044;
pub const RPMTAG_REQUIREFLAGS: u32 = 1048;
pub const RPMTAG_REQUIRENAME: u32 = 1049;
pub const RPMTAG_REQUIREVERSION: u32 = 1050;
pub const RPMTAG_SOURCEPACKAGE: u32 = 1106;

pub const RPMSIGTAG_DSA: u32 = 267;
pub const RPMSIGTAG_RSA: u32 = 268;
pub const RPMSIGTAG_SHA1: u32 = 269;
pub const RPMSIGTAG_SHA256: u32 = 273;
pub const RPMSIGTAG_SIZE: u32 = 1000;
pub const RPMSIGTAG_PGP: u32 = 1002;
pub const RPMSIGTAG_MD5: u32 = 1004;
pub const RPMSIGTAG_GPG: u32 = 1005;

/// Data type of a header entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryType {
    Null,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    String,
    Binary,
    StringArray,
    I18nString,
}

impl EntryType {
    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Null,
            1 => Self::Char,
            2 => Self::Int8,
            3 => Self::Int16,
            4 => Self::Int32,
            5 => Self::Int64,
            6 => Self::String,
            7 => Self::Binary,
            8 => Self::StringArray,
            9 => Self::I18nString,
            _ => return None,
        })
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Char => 1,
            Self::Int8 => 2,
            Self::Int16 => 3,
            Self::Int32 => 4,
            Self::Int64 => 5,
            Self::String => 6,
            Self::Binary => 7,
            Self::StringArray => 8,
            Self::I18nString => 9,
        }
    }
}

/// A decoded header entry value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryValue {
    Null,
    Char(Vec<u8>),
    Int8(Vec<u8>),
    Int16(Vec<u16>),
    Int32(Vec<u32>),
    Int64(Vec<u64>),
    String(String),
    Binary(Vec<u8>),
    StringArray(Vec<String>),
    I18nString(Vec<String>),
}

impl EntryValue {
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Null => EntryType::Null,
            Self::Char(_) => EntryType::Char,
            Self::Int8(_) => EntryType::Int8,
            Self::Int16(_) => EntryType::Int16,
            Self::Int32(_) => EntryType::Int32,
            Self::Int64(_) => EntryType::Int64,
            Self::String(_) => EntryType::String,
            Self::Binary(_) => EntryType::Binary,
            Self::StringArray(_) => EntryType::StringArray,
            Self::I18nString(_) => EntryType::I18nString,
        }
    }
}

/// The lead of an RPM file.
#[derive(Clone, Debug)]
pub struct Lead {
    pub major: u8,
    pub minor: u8,
    /// 0 for binary packages, 1 for source packages.
    pub package_type: u16,
    pub name: String,
    pub signature_type: u16,
}

impl Lead {
    /// Parse a lead from exactly [LEAD_SIZE] bytes.
    ///
    /// Returns `None` if the magic does not match.
    pub fn parse(data: &[u8; LEAD_SIZE]) -> Option<Self> {
        if data[0..4] != LEAD_MAGIC {
            return None;
        }

        let name = &data[10..76];
        let name_end = name.iter().position(|b| *b == 0).unwrap_or(name.len());

        Some(Self {
            major: data[4],
            minor: data[5],
            package_type: u16::from_be_bytes([data[6], data[7]]),
            name: String::from_utf8_lossy(&name[..name_end]).to_string(),
            signature_type: u16::from_be_bytes([data[78], data[79]]),
        })
    }

    pub fn is_source(&self) -> bool {
        self.package_type == 1
    }
}

fn malformed(message: impl ToString) -> BuildDepError {
    BuildDepError::HeaderMalformed(message.to_string())
}

fn read_nul_terminated(data: &[u8], offset: usize) -> Result<(String, usize)> {
    let remaining = data
        .get(offset..)
        .ok_or_else(|| malformed("string offset out of bounds"))?;
    let end = remaining
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| malformed("unterminated string in data store"))?;

    Ok((
        String::from_utf8_lossy(&remaining[..end]).to_string(),
        offset + end + 1,
    ))
}

fn read_fixed<const N: usize>(data: &[u8], offset: usize, count: usize) -> Result<Vec<[u8; N]>> {
    let end = count
        .checked_mul(N)
        .and_then(|size| size.checked_add(offset))
        .ok_or_else(|| malformed("entry size overflow"))?;
    let region = data
        .get(offset..end)
        .ok_or_else(|| malformed("entry extends past data store"))?;

    Ok(region
        .chunks_exact(N)
        .map(|chunk| {
            let mut value = [0u8; N];
            value.copy_from_slice(chunk);
            value
        })
        .collect())
}

fn decode_entry(
    entry_type: EntryType,
    data: &[u8],
    offset: usize,
    count: usize,
) -> Result<EntryValue> {
    Ok(match entry_type {
        EntryType::Null => EntryValue::Null,
        EntryType::Char => EntryValue::Char(
            read_fixed::<1>(data, offset, count)?
                .into_iter()
                .map(|v| v[0])
                .collect(),
        ),
        EntryType::Int8 => EntryValue::Int8(
            read_fixed::<1>(data, offset, count)?
                .into_iter()
                .map(|v| v[0])
                .collect(),
        ),
        EntryType::Int16 => EntryValue::Int16(
            read_fixed::<2>(data, offset, count)?
                .into_iter()
                .map(u16::from_be_bytes)
                .collect(),
        ),
        EntryType::Int32 => EntryValue::Int32(
            read_fixed::<4>(data, offset, count)?
                .into_iter()
                .map(u32::from_be_bytes)
                .collect(),
        ),
        EntryType::Int64 => EntryValue::Int64(
            read_fixed::<8>(data, offset, count)?
                .into_iter()
                .map(u64::from_be_bytes)
                .collect(),
        ),
        EntryType::Binary => EntryValue::Binary(
            read_fixed::<1>(data, offset, count)?
                .into_iter()
                .map(|v| v[0])
                .collect(),
        ),
        EntryType::String => EntryValue::String(read_nul_terminated(data, offset)?.0),
        EntryType::StringArray | EntryType::I18nString => {
            let mut strings = Vec::with_capacity(count.min(4096));
            let mut position = offset;
            for _ in 0..count {
                let (s, next) = read_nul_terminated(data, position)?;
                strings.push(s);
                position = next;
            }

            if entry_type == EntryType::StringArray {
                EntryValue::StringArray(strings)
            } else {
                EntryValue::I18nString(strings)
            }
        }
    })
}

/// A parsed header structure.
#[derive(Clone, Debug)]
pub struct Header {
    entries: BTreeMap<u32, EntryValue>,
    raw: Vec<u8>,
}

impl Header {
    /// Read a header structure from a reader.
    ///
    /// The reader is left positioned immediately after the data store.
    pub fn read(reader: &mut impl Read) -> Result<Self> {
        let mut intro = [0u8; 16];
        reader
            .read_exact(&mut intro)
            .map_err(|e| malformed(format!("reading header intro: {}", e)))?;

        if intro[0..3] != HEADER_MAGIC {
            return Err(malformed("bad header magic"));
        }
        if intro[3] != 1 {
            return Err(malformed(format!("unsupported header version {}", intro[3])));
        }

        let index_count = u32::from_be_bytes([intro[8], intro[9], intro[10], intro[11]]);
        let data_size = u32::from_be_bytes([intro[12], intro[13], intro[14], intro[15]]);

        if index_count == 0 || index_count > HEADER_TAGS_MAX {
            return Err(malformed(format!("bad index entry count {}", index_count)));
        }
        if data_size > HEADER_DATA_MAX {
            return Err(malformed(format!("data store too large: {}", data_size)));
        }

        // The buffer grows with the data actually read so a bogus intro can't
        // force a large allocation.
        let remaining = index_count as u64 * 16 + data_size as u64;
        let mut raw = intro.to_vec();
        let read = reader
            .take(remaining)
            .read_to_end(&mut raw)
            .map_err(|e| malformed(format!("reading header index and data: {}", e)))?;
        if (read as u64) < remaining {
            return Err(malformed(format!(
                "header truncated: expected {} bytes of index and data, got {}",
                remaining, read
            )));
        }

        Self::parse_raw(raw, index_count as usize)
    }

    fn parse_raw(raw: Vec<u8>, index_count: usize) -> Result<Self> {
        let data_start = 16 + index_count * 16;
        let (index, data) = raw[16..].split_at(data_start - 16);
        let mut entries = BTreeMap::new();

        for chunk in index.chunks_exact(16) {
            let field = |i: usize| {
                u32::from_be_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
            };
            let (tag, raw_type, offset, count) = (field(0), field(4), field(8), field(12));

            let entry_type = EntryType::from_raw(raw_type).ok_or_else(|| {
                malformed(format!("tag {} has unknown data type {}", tag, raw_type))
            })?;

            let offset = offset as usize;
            if offset > data.len() {
                return Err(malformed(format!("tag {} offset out of bounds", tag)));
            }

            let value = decode_entry(entry_type, data, offset, count as usize)?;
            if entries.insert(tag, value).is_some() {
                diagnostics::emit(Level::Debug, format!("duplicate header tag {}", tag));
            }
        }

        Ok(Self { entries, raw })
    }

    /// The serialized bytes of this header, from the magic through the data store.
    ///
    /// Header digests and signatures are computed over these bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Size in bytes of the serialized header.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    pub fn get(&self, tag: u32) -> Option<&EntryValue> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Obtain the value of a string tag.
    ///
    /// The first element of an i18n string array is returned for i18n tags.
    pub fn string(&self, tag: u32) -> Option<&str> {
        match self.get(tag)? {
            EntryValue::String(s) => Some(s),
            EntryValue::I18nString(v) | EntryValue::StringArray(v) => {
                v.first().map(|s| s.as_str())
            }
            _ => None,
        }
    }

    pub fn string_array(&self, tag: u32) -> Option<&[String]> {
        match self.get(tag)? {
            EntryValue::StringArray(v) | EntryValue::I18nString(v) => Some(v),
            _ => None,
        }
    }

    pub fn u32_array(&self, tag: u32) -> Option<&[u32]> {
        match self.get(tag)? {
            EntryValue::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn binary(&self, tag: u32) -> Option<&[u8]> {
        match self.get(tag)? {
            EntryValue::Binary(v) => Some(v),
            _ => None,
        }
    }
}

/// The main header of a package, with accessors for package metadata.
#[derive(Clone, Debug)]
pub struct RpmHeader {
    header: Header,
}

impl From<Header> for RpmHeader {
    fn from(header: Header) -> Self {
        Self { header }
    }
}

impl RpmHeader {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn name(&self) -> Option<&str> {
        self.header.string(RPMTAG_NAME)
    }

    pub fn version(&self) -> Option<&str> {
        self.header.string(RPMTAG_VERSION)
    }

    pub fn release(&self) -> Option<&str> {
        self.header.string(RPMTAG_RELEASE)
    }

    pub fn epoch(&self) -> Option<u32> {
        self.header
            .u32_array(RPMTAG_EPOCH)
            .and_then(|v| v.first().copied())
    }

    /// Whether this is the header of a source package.
    ///
    /// Binary packages record the source package they were built from. Source
    /// packages do not.
    pub fn is_source(&self) -> bool {
        !self.header.contains(RPMTAG_SOURCERPM) || self.header.contains(RPMTAG_SOURCEPACKAGE)
    }

    /// The `name-[epoch:]version-release` of this package.
    pub fn nevr(&self) -> String {
        let epoch = self
            .epoch()
            .map(|e| format!("{}:", e))
            .unwrap_or_default();

        format!(
            "{}-{}{}-{}",
            self.name().unwrap_or("(none)"),
            epoch,
            self.version().unwrap_or("(none)"),
            self.release().unwrap_or("(none)")
        )
    }

    /// The requirements of this package, in header order.
    ///
    /// For source packages these are the build requirements.
    pub fn requires(&self) -> Result<Vec<Dependency>> {
        let names = match self.header.string_array(RPMTAG_REQUIRENAME) {
            Some(names) => names,
            None => return Ok(vec![]),
        };
        let flags = self.header.u32_array(RPMTAG_REQUIREFLAGS);
        let versions = self.header.string_array(RPMTAG_REQUIREVERSION);

        if flags.map(|v| v.len() != names.len()).unwrap_or(false)
            || versions.map(|v| v.len() != names.len()).unwrap_or(false)
        {
            return Err(malformed("require tags have mismatched lengths"));
        }

        Ok(names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Dependency::new(
                    name,
                    DependencyFlags::from_raw(flags.map(|v| v[i]).unwrap_or(0)),
                    versions.map(|v| v[i].as_str()).unwrap_or(""),
                )
            })
            .collect())
    }
}

/// The headers of an RPM file.
#[derive(Clone, Debug)]
pub struct PackageHeaders {
    pub lead: Lead,
    pub signature: Header,
    pub header: RpmHeader,
}

impl PackageHeaders {
    /// Read the lead and both headers from a reader positioned at the start of an RPM file.
    ///
    /// `display_name` is used in error messages. On success the reader is positioned at
    /// the start of the payload.
    pub fn read(reader: &mut impl Read, display_name: &str) -> Result<Self> {
        let mut lead_data = [0u8; LEAD_SIZE];
        reader
            .read_exact(&mut lead_data)
            .map_err(|_| BuildDepError::NotAnRpm(display_name.to_string()))?;

        let lead = Lead::parse(&lead_data)
            .ok_or_else(|| BuildDepError::NotAnRpm(display_name.to_string()))?;

        if lead.major < 3 {
            diagnostics::emit(
                Level::Warning,
                format!(
                    "{}: unsupported lead version {}.{}",
                    display_name, lead.major, lead.minor
                ),
            );
        }

        let signature = Header::read(reader)?;

        let padding = (8 - signature.size() % 8) % 8;
        if padding > 0 {
            let mut pad = [0u8; 8];
            reader
                .read_exact(&mut pad[..padding])
                .map_err(|e| malformed(format!("reading signature padding: {}", e)))?;
        }

        let header = RpmHeader::from(Header::read(reader)?);

        Ok(Self {
            lead,
            signature,
            header,
        })
    }
}
