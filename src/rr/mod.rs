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

//! Data structures and routines for handling DNS resource record data.
//!
//! Record data (RDATA) is stored as opaque octets; the [`helpers`]
//! module provides readers and writers for the handful of field layouts
//! the zone core must interpret itself (SOA fields, embedded domain
//! names, SVCB targets). Each record additionally carries a metadata
//! tag (see [`RecordInfo`]) holding the disabled flag, comments, and
//! the type-specific extras this core tracks: glue for NS records, the
//! serial numbering scheme for SOA records, and automatic address
//! hints for SVCB records.

mod cmp;
pub mod helpers;
mod rdata;
mod record;
mod rr_type;
mod rrset;
mod serial;
mod ttl;

pub use rdata::{Rdata, RdataBuf, RdataTooLongError};
pub use record::{GenericInfo, NsInfo, Record, RecordInfo, SerialScheme, SoaInfo, SvcbInfo};
pub use rr_type::Type;
pub use rrset::{Rrset, RrsetAddError};
pub use serial::Serial;
pub use ttl::Ttl;
