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

//! Implementation of data structures related to domain names.

use std::alloc::{self, Layout};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};
use std::ptr;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod builder;
mod error;
mod label;
mod wire;
pub use builder::NameBuilder;
pub use error::Error;
pub use label::{Label, LabelBuf};

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A structure to represent a domain name.
///
/// This is a dynamically sized type, generally used through the `&Name`
/// and `Box<Name>` types.
///
/// Boxed `Name`s can be constructed in several ways:
///
/// * through the [`FromStr`] implementation;
/// * through a [`NameBuilder`]; and
/// * from uncompressed on-the-wire names (as they appear embedded in
///   RDATA) through [`Name::try_from_uncompressed`] and
///   [`Name::try_from_uncompressed_all`].
///
/// Comparison and hashing are ASCII-case-insensitive, while the
/// internal representation preserves the case in which the name was
/// written. The [`Ord`] implementation is the DNSSEC canonical ordering
/// of domain names, which the zone tree and NSEC chain code rely on.
///
/// Internally, a `Name` is represented by the following fields, in
/// order:
///
/// * One octet, `n_labels`, provides the number of labels in the name.
/// * An array of `n_labels` octets provides the offset of each label
///   in the on-the-wire representation of the name, as defined in
///   [RFC 1035 § 3.1].
/// * The on-the-wire representation of the name mentioned above.
///
/// The `Name` structure as defined in Rust includes the `n_labels`
/// field, since it has fixed size, but the label offsets and
/// on-the-wire representation do not have fixed size. In Rust, only the
/// final field of a structure may be unsized, so these are combined
/// into a single unsized field called `data`. The private
/// `label_offsets` method provides access to the label-offset portion
/// for the implementation, and the public [`Name::wire_repr`] method
/// provides access to the wire-representation portion.
///
/// The internal representation used here follows that used by the [NSD]
/// authoritative nameserver. The reason for using a finicky custom DST
/// is to promote data locality: domain names appear very frequently in
/// DNS processing, and with this model short domain names (a common
/// occurrence) may often reside within a single cache line.
///
/// [NSD]: https://www.nlnetlabs.nl/projects/nsd/about/
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[repr(C)]
pub struct Name {
    n_labels: u8,
    data: [u8],
}

/// Private helpers to access unsized fields.
impl Name {
    /// Returns the offset of label `n` in the `Name`'s on-the-wire
    /// representation.
    fn label_offset(&self, n: usize) -> usize {
        self.label_offsets()[n] as usize
    }

    /// Returns the offsets of the labels in the `Name`'s on-the-wire
    /// representation.
    fn label_offsets(&self) -> &[u8] {
        &self.data[0..self.len()]
    }
}

/// Private allocation/initialization helpers for use within this module.
impl Name {
    /// Converts a pointer to a buffer in which a name has been
    /// initialized and size information into a const pointer to a
    /// `Name`. Since `Name` is a dynamically sized type, this will be a
    /// fat pointer that includes the size information for the `Name`.
    ///
    /// # Safety
    ///
    /// This operation is not unsafe in itself, but if you want to
    /// actually _use_ the returned pointer/convert it to a reference,
    /// you need to make sure that
    ///
    /// * the buffer has been initialized to a valid `Name` value;
    /// * the memory region lies within a single allocation;
    /// * `n_labels` and `wire_len` are correct; and
    /// * the data is not mutated during the lifetime of the created
    ///   reference.
    fn make_fat_pointer(octets: *const u8, n_labels: usize, wire_len: usize) -> *const Name {
        // NOTE: if/when std::ptr::from_raw_parts becomes available, use
        // it instead. This relies on the representation of slice fat
        // pointers, which is how the slice-dst crate works as well.
        ptr::slice_from_raw_parts(octets, n_labels + wire_len) as *const Name
    }

    /// The mutable variant of [`Name::make_fat_pointer`].
    ///
    /// # Safety
    ///
    /// The safety points made for [`Name::make_fat_pointer`] apply, and
    /// in addition there must be no accesses whatsoever (reads or
    /// writes) through other pointers not derived from the one returned
    /// during the lifetime of the created reference.
    fn make_fat_pointer_mut(octets: *mut u8, n_labels: usize, wire_len: usize) -> *mut Name {
        ptr::slice_from_raw_parts_mut(octets, n_labels + wire_len) as *mut Name
    }

    /// Initializes a new `Name` structure at the given allocation.
    ///
    /// This will fill in the `n_labels` field based on the number of
    /// label offsets provided. The `label_offsets` slice gives the
    /// index of the starting octet of each label in the domain name's
    /// on-the-wire representation. The slices given in `slices`, when
    /// concatenated, provide the on-the-wire representation of the
    /// name being constructed.
    ///
    /// # Safety
    ///
    /// The caller must ensure that
    ///
    /// * the provided memory region is in fact a single allocation;
    /// * the allocation is valid for writes for the proper size (use
    ///   [`Name::size_required_for`] for this);
    /// * the `slices` provide a valid domain name in the on-the-wire
    ///   representation, and `label_offsets` provides the offsets of
    ///   the labels correctly; and
    /// * none of the slices overlaps the allocation, since
    ///   [`ptr::copy_nonoverlapping`] is used under the hood.
    unsafe fn initialize_into(allocation: *mut u8, label_offsets: &[u8], slices: &[&[u8]]) {
        let n_labels = label_offsets.len();
        allocation.write(n_labels as u8);
        ptr::copy_nonoverlapping(
            label_offsets as *const [u8] as *const u8,
            allocation.add(1),
            n_labels,
        );
        let mut index = 1 + n_labels;
        for slice in slices {
            ptr::copy_nonoverlapping(
                *slice as *const [u8] as *const u8,
                allocation.add(index),
                slice.len(),
            );
            index += slice.len();
        }
    }

    /// Returns the size required for a `Name` structure representing
    /// a domain name with `n_labels` labels and whose on-the-wire
    /// representation is `wire_len` octets long.
    const fn size_required_for(n_labels: usize, wire_len: usize) -> usize {
        1 + n_labels + wire_len
    }
}

////////////////////////////////////////////////////////////////////////
// NAME PUBLIC API                                                    //
////////////////////////////////////////////////////////////////////////

#[allow(clippy::len_without_is_empty)] // A domain name is never empty!
impl Name {
    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a == b)
    }

    /// Returns whether this `Name` is a proper subdomain of `other`
    /// (that is, a subdomain not equal to `other`).
    pub fn proper_subdomain_of(&self, other: &Name) -> bool {
        self.len() > other.len() && self.eq_or_subdomain_of(other)
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.n_labels == 1
    }

    /// Returns whether the `Name` is a wildcard domain name (i.e.,
    /// whether its first label is `*`).
    pub fn is_wildcard(&self) -> bool {
        self[0].is_asterisk()
    }

    /// Returns an iterator over labels in this `Name`.
    pub fn labels(&self) -> Labels {
        Labels::new(self)
    }

    /// Returns the number of labels in this `Name`.
    pub fn len(&self) -> usize {
        self.n_labels as usize
    }

    /// Makes all ASCII letters in this `Name` lowercase.
    ///
    /// This is provided with [RFC 4034 § 6.2] (DNSSEC canonical RR
    /// form) in mind.
    ///
    /// [RFC 4034 § 6.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.2
    pub fn make_ascii_lowercase(&mut self) {
        // NOTE: we just iterate manually, since writing a LabelsMut
        // iterator is tricky due to lifetime issues.
        for i in 0..self.len() {
            self[i].octets_mut().make_ascii_lowercase();
        }
    }

    /// Returns a reference to a `Name` representing the DNS root, `.`.
    pub fn root() -> &'static Name {
        static ROOT_NAME_REPR: [u8; 3] = [1, 0, 0];
        unsafe {
            // SAFETY: this is a valid Name value; the data is within a
            // single object/allocation; the number of labels and wire
            // length are indeed both 1; and the data will not ever be
            // mutated.
            &*Name::make_fat_pointer(&ROOT_NAME_REPR as *const [u8] as *const u8, 1, 1)
        }
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    pub fn superdomain(&self, skip: usize) -> Option<Box<Name>> {
        if skip < self.len() {
            let start = self.label_offset(skip);
            let slice = &self.wire_repr()[start..];
            let original_label_offsets = &self.label_offsets()[skip..];
            let new_label_offsets: ArrayVec<u8, MAX_N_LABELS> = original_label_offsets
                .iter()
                .map(|offset| offset - original_label_offsets[0])
                .collect();
            unsafe {
                // SAFETY: extracting a superdomain (and adjusting the
                // label offsets) as we have done here yields a valid
                // domain name (and the correct corresponding label
                // offsets).
                Some(new_boxed_name(slice.len(), &new_label_offsets, &[slice]))
            }
        } else {
            None
        }
    }

    /// Constructs a new name from the first `keep` labels of this
    /// `Name` followed by all of the labels of `suffix`.
    ///
    /// This is the substitution primitive needed to rewrite names under
    /// a DNAME (see [RFC 6672 § 2.2]) and to place hashed NSEC3 owner
    /// labels under a zone apex. It fails if the result would be too
    /// long. `keep` must be less than the number of labels in this
    /// `Name` (the null label cannot be kept).
    ///
    /// [RFC 6672 § 2.2]: https://datatracker.ietf.org/doc/html/rfc6672#section-2.2
    pub fn with_suffix(&self, keep: usize, suffix: &Name) -> Result<Box<Name>, Error> {
        assert!(keep < self.len());
        if keep == 0 {
            return Ok(suffix.to_owned());
        }
        let mut builder = NameBuilder::new();
        for (i, label) in self.labels().take(keep).enumerate() {
            if i > 0 {
                builder.next_label()?;
            }
            builder.try_push_slice(label.octets())?;
        }
        builder.finish_with_suffix(suffix)
    }

    /// Tries to parse an uncompressed name present at the start of the
    /// provided buffer. The name need not occupy the entire buffer;
    /// extra data is ignored. If the name is valid, a new boxed `Name`
    /// is returned along with the length of the name in octets.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Box<Self>, usize), Error> {
        wire::parse_uncompressed_name(octets, false)
    }

    /// Like [`Name::try_from_uncompressed`], but in addition fails if
    /// there is extra data in the buffer after the name (and does not
    /// return the length of the name on success, since it is equal to
    /// the length of the buffer).
    pub fn try_from_uncompressed_all(octets: &[u8]) -> Result<Box<Self>, Error> {
        wire::parse_uncompressed_name(octets, true).map(|(name, _)| name)
    }

    /// Validates an uncompressed name present at the start of the
    /// provided buffer; this is [`Name::try_from_uncompressed`], except
    /// it does not allocate a new boxed `Name`. The name need not
    /// occupy the entire buffer; extra data is ignored. If it is valid,
    /// the length of the name in octets is returned.
    pub fn validate_uncompressed(octets: &[u8]) -> Result<usize, Error> {
        wire::validate_uncompressed_name(octets, false)
    }

    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.data[self.len()..]
    }

    /// The mutable version of [`Name::wire_repr`] for internal use. All
    /// (internal) users must be sure to keep the label count and label
    /// offsets in sync with any modifications made.
    fn wire_repr_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[len..]
    }
}

impl Index<usize> for Name {
    type Output = Label;

    fn index(&self, index: usize) -> &Self::Output {
        let offset = self.label_offset(index);
        let len = self.wire_repr()[offset] as usize;
        let start = offset + 1;
        let end = start + len;
        Label::from_unchecked(&self.wire_repr()[start..end])
    }
}

impl IndexMut<usize> for Name {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        let offset = self.label_offset(index);
        let len = self.wire_repr()[offset] as usize;
        let start = offset + 1;
        let end = start + len;
        Label::from_unchecked_mut(&mut self.wire_repr_mut()[start..end])
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.len() <= 1 {
            f.write_str(".")
        } else {
            // NOTE: the unwrap() is okay, since we never construct
            // Names with no labels.
            let mut labels = self.labels();
            labels.next().unwrap().fmt(f)?;
            for label in labels {
                write!(f, ".{}", label)?;
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.labels().zip(other.labels()).all(|(a, b)| a == b)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The [`Ord`] implementation for `Name` employs DNSSEC's canonical
/// ordering of domain names. Per [RFC 4034 § 6.1], `Name`s are ordered
/// as strings of labels read from right to left.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .find_map(|(a, b)| Some(a.cmp(b)).filter(|ordering| ordering.is_ne()))
            .unwrap_or_else(|| self.len().cmp(&other.len()))
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in self.labels() {
            label.hash(state);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the [`Label`]s in a [`Name`].
///
/// To use this iterator, construct one from a [`Name`] using
/// [`Name::labels`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    name: &'a Name,
    front: usize,
    back: usize,
}

impl Labels<'_> {
    fn new(name: &Name) -> Labels {
        Labels {
            name,
            front: 0,
            back: name.len(),
        }
    }
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a Label;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let this_one = self.front;
            self.front += 1;
            Some(&self.name[this_one])
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(&self.name[self.back])
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// ALLOCATION AND CLONING OF BOXED NAMES                              //
////////////////////////////////////////////////////////////////////////

/// Allocates and initializes a `Box<Name>`. `wire_len` gives the length
/// (in octets) of the on-the-wire representation of the name.
/// `label_offsets` provides the index of the start of each label in the
/// on-the-wire representation, and the slices in `slices`, when
/// concatenated, provide the on-the-wire representation itself.
///
/// # Safety
///
/// The caller must ensure that:
///
/// * the slices of `slices`, when concatenated, give a valid
///   on-the-wire representation of a domain name, and
/// * `wire_len` and `label_offsets` correctly describe that domain
///   name.
unsafe fn new_boxed_name(wire_len: usize, label_offsets: &[u8], slices: &[&[u8]]) -> Box<Name> {
    // SAFETY:
    // * from_size_align_unchecked: alignment is nonzero and is 2^0.
    //   Since the alignment is 1, we don't need to worry about
    //   overflowing usize::MAX when rounding size up to the nearest
    //   multiple of the alignment.
    // * alloc: the layout has nonzero size (see the implementation of
    //   size_required_for above).
    // * initialize_into: the memory region is one allocation and should
    //   not overlap with any of the slices, since it's a new
    //   allocation. Our caller has promised that label_offsets and
    //   slices give a valid domain name.
    // * from_raw: we know the memory layout of a Name (that's why we
    //   make it repr(C)) and promise that we have computed it properly
    //   here. We also only call from_raw with name_ptr once, so no
    //   double-freeing will occur.
    let n_labels = label_offsets.len();
    let size = Name::size_required_for(n_labels, wire_len);
    let layout = Layout::from_size_align_unchecked(size, 1);
    let allocation = alloc::alloc(layout);
    Name::initialize_into(allocation, label_offsets, slices);
    let name_ptr = Name::make_fat_pointer_mut(allocation, n_labels, wire_len);
    Box::from_raw(name_ptr)
}

impl ToOwned for Name {
    type Owned = Box<Name>;

    fn to_owned(&self) -> Self::Owned {
        unsafe {
            // SAFETY: this module guarantees that the Names it creates
            // represent valid domain names, so we're giving
            // new_boxed_name valid arguments.
            new_boxed_name(
                self.wire_repr().len(),
                self.label_offsets(),
                &[self.wire_repr()],
            )
        }
    }
}

impl Clone for Box<Name> {
    fn clone(&self) -> Self {
        self.as_ref().to_owned()
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a boxed [`Name`]. The
/// passed string must be strictly ASCII. Escape sequences as defined by
/// [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Box<Name> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root().to_owned());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut builder = NameBuilder::new();

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                builder.try_push(value)?;
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                builder.next_label()?;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                builder.try_push(octet)?;
                remaining_octets = &remaining_octets[1..];
            }
        }
        builder.finish()
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    if remaining_octets.is_empty() {
        Err(Error::InvalidEscape)
    } else if remaining_octets[0].is_ascii_digit() {
        if remaining_octets.len() < 3
            || !remaining_octets[1].is_ascii_digit()
            || !remaining_octets[2].is_ascii_digit()
        {
            Err(Error::InvalidEscape)
        } else {
            let hundreds = (remaining_octets[0] - b'0') as usize;
            let tens = (remaining_octets[1] - b'0') as usize;
            let ones = (remaining_octets[2] - b'0') as usize;
            let value = 100 * hundreds + 10 * tens + ones;
            if value > 255 {
                Err(Error::InvalidEscape)
            } else {
                Ok((value as u8, 3))
            }
        }
    } else {
        Ok((remaining_octets[0], 1))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
