// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # VSPM caller-side layouts
//!
//! Byte-exact descriptions of the parameter structures a client application
//! hands to the VSPM interface, in both the native (64-bit) and the 32-bit
//! compatibility encoding.
//!
//! Every structure is declared once through the `layout!` macro and can be
//! encoded into, or decoded from, either ABI. Pointer-sized fields come in two
//! flavours:
//!
//! - [`UserPtr`]: a link to another structure in caller memory. The kernel
//!   side follows these and replaces them with owned copies.
//! - [`Addr`]: an address value (hardware or table address) that is passed
//!   through untouched, or rewritten to a kernel-owned buffer.
//!
//! `unsigned long` and `long` fields are [`ULong`] and [`Long`]. Under
//! [`Abi::Compat`] they, and both pointer flavours, are 32 bits wide and are
//! widened on decode.
//!
//! ## Example
//!
//! ```
//! use vspm_sys::{vsp::VspDl, Abi, Addr, Layout};
//!
//! let dl = VspDl {
//!     hard_addr: Addr(0),
//!     virt_addr: Addr(0x1000),
//!     tbl_num: 64,
//! };
//! assert_eq!(VspDl::size(Abi::Native), 24);
//! assert_eq!(VspDl::size(Abi::Compat), 12);
//!
//! let bytes = dl.encode(Abi::Compat);
//! assert_eq!(VspDl::decode(Abi::Compat, &bytes), Some(dl));
//! ```

use std::fmt;

/// Declares a C-compatible parameter structure and its [`Layout`].
///
/// Fields are laid out in declaration order with natural alignment and tail
/// padding, matching the C compiler for the target ABI.
macro_rules! layout {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::Field for $name {
            fn align(abi: $crate::Abi) -> usize {
                let mut align = 1;
                $(align = align.max(<$ty as $crate::Field>::align(abi));)*
                align
            }

            fn extent(abi: $crate::Abi) -> usize {
                let mut offset = 0;
                $(
                    offset = $crate::align_up(offset, <$ty as $crate::Field>::align(abi))
                        + <$ty as $crate::Field>::extent(abi);
                )*
                $crate::align_up(offset, <Self as $crate::Field>::align(abi))
            }

            fn put(&self, enc: &mut $crate::Encoder) {
                let align = <Self as $crate::Field>::align(enc.abi());
                enc.align_to(align);
                $($crate::Field::put(&self.$field, enc);)*
                enc.align_to(align);
            }

            fn get(dec: &mut $crate::Decoder<'_>) -> Self {
                let align = <Self as $crate::Field>::align(dec.abi());
                dec.align_to(align);
                let value = Self {
                    $($field: <$ty as $crate::Field>::get(dec),)*
                };
                dec.align_to(align);
                value
            }
        }

        impl $crate::Layout for $name {
            const NAME: &'static str = stringify!($name);
        }
    };
}

pub mod fdp;
pub mod vsp;
pub mod vspm;

/// Caller ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    /// Caller shares the kernel's 64-bit pointer and `long` width.
    Native,
    /// 32-bit caller on a 64-bit kernel.
    Compat,
}

impl Abi {
    /// Width in bytes of pointers, `long` and `unsigned long`.
    pub const fn word_size(self) -> usize {
        match self {
            Abi::Native => 8,
            Abi::Compat => 4,
        }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Abi::Native => write!(f, "native"),
            Abi::Compat => write!(f, "compat32"),
        }
    }
}

/// Link to another structure in caller memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserPtr(pub u64);

impl UserPtr {
    pub const NULL: UserPtr = UserPtr(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Address `bytes` past this one, or `None` on overflow.
    pub fn checked_add(self, bytes: u64) -> Option<UserPtr> {
        self.0.checked_add(bytes).map(UserPtr)
    }
}

impl From<Addr> for UserPtr {
    fn from(addr: Addr) -> Self {
        UserPtr(addr.0)
    }
}

impl fmt::Display for UserPtr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Pointer-sized address value that is not followed by the copier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub u64);

impl Addr {
    pub const NULL: Addr = Addr(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<UserPtr> for Addr {
    fn from(ptr: UserPtr) -> Self {
        Addr(ptr.0)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// C `unsigned long`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ULong(pub u64);

/// C `long`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Long(pub i64);

/// Rounds `offset` up to a multiple of `align`.
pub const fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

/// Little-endian writer that applies the C layout rules of one ABI.
#[derive(Debug)]
pub struct Encoder {
    abi: Abi,
    bytes: Vec<u8>,
}

impl Encoder {
    pub fn new(abi: Abi) -> Self {
        Self {
            abi,
            bytes: Vec::new(),
        }
    }

    pub fn abi(&self) -> Abi {
        self.abi
    }

    pub fn align_to(&mut self, align: usize) {
        while self.bytes.len() % align != 0 {
            self.bytes.push(0);
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.align_to(2);
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.align_to(4);
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an unsigned pointer-sized value. Compat callers only see the
    /// low 32 bits.
    pub fn put_word(&mut self, value: u64) {
        match self.abi {
            Abi::Native => {
                self.align_to(8);
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
            Abi::Compat => self.put_u32(value as u32),
        }
    }

    /// Writes a signed pointer-sized value.
    pub fn put_sword(&mut self, value: i64) {
        match self.abi {
            Abi::Native => {
                self.align_to(8);
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
            Abi::Compat => {
                self.align_to(4);
                self.bytes.extend_from_slice(&(value as i32).to_le_bytes());
            }
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Little-endian reader mirroring [`Encoder`].
///
/// Reads past the end of the input yield zero; [`Layout::decode`] checks the
/// input length before handing out a decoder so that never happens for a
/// complete structure.
#[derive(Debug)]
pub struct Decoder<'a> {
    abi: Abi,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(abi: Abi, bytes: &'a [u8]) -> Self {
        Self { abi, bytes, pos: 0 }
    }

    pub fn abi(&self) -> Abi {
        self.abi
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn align_to(&mut self, align: usize) {
        let rem = self.pos % align;
        if rem != 0 {
            self.pos += align - rem;
        }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(src) = self.bytes.get(self.pos..self.pos + N) {
            out.copy_from_slice(src);
        }
        self.pos += N;
        out
    }

    pub fn get_u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn get_u16(&mut self) -> u16 {
        self.align_to(2);
        u16::from_le_bytes(self.take())
    }

    pub fn get_u32(&mut self) -> u32 {
        self.align_to(4);
        u32::from_le_bytes(self.take())
    }

    /// Reads an unsigned pointer-sized value, zero-extending compat words.
    pub fn get_word(&mut self) -> u64 {
        match self.abi {
            Abi::Native => {
                self.align_to(8);
                u64::from_le_bytes(self.take())
            }
            Abi::Compat => u64::from(self.get_u32()),
        }
    }

    /// Reads a signed pointer-sized value, sign-extending compat words.
    pub fn get_sword(&mut self) -> i64 {
        match self.abi {
            Abi::Native => {
                self.align_to(8);
                i64::from_le_bytes(self.take())
            }
            Abi::Compat => {
                self.align_to(4);
                i64::from(i32::from_le_bytes(self.take()))
            }
        }
    }
}

/// A value with a defined position inside a C structure.
pub trait Field: Sized {
    /// Alignment requirement under `abi`.
    fn align(abi: Abi) -> usize;
    /// Bytes occupied under `abi`, including tail padding.
    fn extent(abi: Abi) -> usize;
    fn put(&self, enc: &mut Encoder);
    fn get(dec: &mut Decoder<'_>) -> Self;
}

impl Field for u8 {
    fn align(_: Abi) -> usize {
        1
    }

    fn extent(_: Abi) -> usize {
        1
    }

    fn put(&self, enc: &mut Encoder) {
        enc.put_u8(*self);
    }

    fn get(dec: &mut Decoder<'_>) -> Self {
        dec.get_u8()
    }
}

impl Field for u16 {
    fn align(_: Abi) -> usize {
        2
    }

    fn extent(_: Abi) -> usize {
        2
    }

    fn put(&self, enc: &mut Encoder) {
        enc.put_u16(*self);
    }

    fn get(dec: &mut Decoder<'_>) -> Self {
        dec.get_u16()
    }
}

impl Field for u32 {
    fn align(_: Abi) -> usize {
        4
    }

    fn extent(_: Abi) -> usize {
        4
    }

    fn put(&self, enc: &mut Encoder) {
        enc.put_u32(*self);
    }

    fn get(dec: &mut Decoder<'_>) -> Self {
        dec.get_u32()
    }
}

macro_rules! word_field {
    ($ty:ident, $put:ident, $get:ident) => {
        impl Field for $ty {
            fn align(abi: Abi) -> usize {
                abi.word_size()
            }

            fn extent(abi: Abi) -> usize {
                abi.word_size()
            }

            fn put(&self, enc: &mut Encoder) {
                enc.$put(self.0);
            }

            fn get(dec: &mut Decoder<'_>) -> Self {
                $ty(dec.$get())
            }
        }
    };
}

word_field!(UserPtr, put_word, get_word);
word_field!(Addr, put_word, get_word);
word_field!(ULong, put_word, get_word);
word_field!(Long, put_sword, get_sword);

impl<T: Field + Copy + Default, const N: usize> Field for [T; N] {
    fn align(abi: Abi) -> usize {
        T::align(abi)
    }

    fn extent(abi: Abi) -> usize {
        T::extent(abi) * N
    }

    fn put(&self, enc: &mut Encoder) {
        for item in self {
            item.put(enc);
        }
    }

    fn get(dec: &mut Decoder<'_>) -> Self {
        let mut out = [T::default(); N];
        for slot in out.iter_mut() {
            *slot = T::get(dec);
        }
        out
    }
}

/// A complete parameter structure that can cross the caller boundary.
pub trait Layout: Field + Copy + Default {
    /// Structure name used in diagnostics.
    const NAME: &'static str;

    /// `sizeof` under `abi`, including tail padding.
    fn size(abi: Abi) -> usize {
        <Self as Field>::extent(abi)
    }

    fn encode(&self, abi: Abi) -> Vec<u8> {
        let mut enc = Encoder::new(abi);
        self.put(&mut enc);
        enc.into_bytes()
    }

    /// Decodes a structure from exactly the caller's bytes. Returns `None`
    /// when fewer than [`Layout::size`] bytes are supplied.
    fn decode(abi: Abi, bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::size(abi) {
            return None;
        }
        let mut dec = Decoder::new(abi, bytes);
        Some(Self::get(&mut dec))
    }
}
