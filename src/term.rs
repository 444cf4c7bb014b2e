//! External Term Format values: the `Term` union, its wire tags, and the
//! encoder/decoder pair that turns them into/from bytes.
//!
//! PIDs and references carry an optional node identity. `None` means
//! "this value belongs to the local node of whatever connection it
//! travels over" — see [`ConnectionIdentity`] and the elision rules on
//! [`encode`]/[`decode`].

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder as _};
use flate2::read::ZlibDecoder;
use thiserror::Error;

const VERSION: u8 = 131;
const COMPRESSED: u8 = 80;

const SMALL_INTEGER: u8 = 97;
const INTEGER: u8 = 98;
const FLOAT_OLD: u8 = 99;
const SMALL_BIG: u8 = 110;
const LARGE_BIG: u8 = 111;
const NEW_FLOAT: u8 = 70;
const ATOM: u8 = 100;
const SMALL_ATOM: u8 = 115;
const SMALL_ATOM_UTF8: u8 = 119;
const ATOM_UTF8: u8 = 118;
const SMALL_TUPLE: u8 = 104;
const LARGE_TUPLE: u8 = 105;
const NIL: u8 = 106;
const STRING: u8 = 107;
const LIST: u8 = 108;
const BINARY: u8 = 109;
const MAP: u8 = 116;
const NEW_PID: u8 = 88;
const NEWER_REFERENCE: u8 = 90;

/// An interned atom name. Cloning is cheap: it bumps an `Arc` refcount.
#[derive(Clone, Eq)]
pub struct Atom(Arc<str>);

impl Atom {
    pub fn new(name: impl Into<String>) -> Self {
        Atom(Arc::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for Atom {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.0)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::new(s)
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::new(s)
    }
}

/// Sign/magnitude big integer, used only for values too large for `i128`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigInt {
    pub negative: bool,
    /// Little-endian magnitude, no superfluous trailing zero bytes beyond
    /// a single `0x00` for the value zero.
    pub magnitude: Vec<u8>,
}

/// A process identifier as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pid {
    pub node: Option<Atom>,
    pub id: u32,
    pub serial: u32,
    pub creation: u32,
}

/// An opaque reference as it appears on the wire. Erlang references carry
/// up to 5 32-bit words of id; this crate mints and compares 5-word ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub node: Option<Atom>,
    pub id: Vec<u32>,
    pub creation: u32,
}

/// A decoded or to-be-encoded External Term Format value.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Integer(i128),
    BigInt(BigInt),
    Float(f64),
    Atom(Atom),
    Tuple(Vec<Term>),
    Nil,
    /// The STRING tag: a list of small integers encoded compactly as raw
    /// bytes. Decoded distinctly from `List` so round-tripping preserves
    /// which tag the peer actually used.
    String(Vec<u8>),
    List(Vec<Term>, Box<Term>),
    Binary(Vec<u8>),
    Map(Vec<(Term, Term)>),
    Pid(Pid),
    Reference(Reference),
}

impl Term {
    pub fn tuple(elements: impl Into<Vec<Term>>) -> Term {
        Term::Tuple(elements.into())
    }

    pub fn list(elements: impl Into<Vec<Term>>) -> Term {
        let elements = elements.into();
        if elements.is_empty() {
            Term::Nil
        } else {
            Term::List(elements, Box::new(Term::Nil))
        }
    }

    pub fn atom(name: impl Into<String>) -> Term {
        Term::Atom(Atom::new(name))
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Term::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Term::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pid(&self) -> Option<&Pid> {
        match self {
            Term::Pid(p) => Some(p),
            _ => None,
        }
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::Integer(v as i128)
    }
}

impl From<u32> for Term {
    fn from(v: u32) -> Self {
        Term::Integer(v as i128)
    }
}

impl From<Atom> for Term {
    fn from(a: Atom) -> Self {
        Term::Atom(a)
    }
}

impl From<Pid> for Term {
    fn from(p: Pid) -> Self {
        Term::Pid(p)
    }
}

/// { [`Atom`], [`Atom`], arity }, the shape a module/function/arity spec
/// travels as on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Mfa {
    pub module: Atom,
    pub function: Atom,
    pub arity: u8,
}

impl From<Mfa> for Term {
    fn from(v: Mfa) -> Self {
        Term::tuple(vec![
            Term::Atom(v.module),
            Term::Atom(v.function),
            Term::Integer(v.arity as i128),
        ])
    }
}

/// Either a [`Pid`] or a registered name, the shape a send's destination
/// takes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum PidOrAtom {
    Pid(Pid),
    Atom(Atom),
}

impl From<PidOrAtom> for Term {
    fn from(v: PidOrAtom) -> Self {
        match v {
            PidOrAtom::Pid(p) => Term::Pid(p),
            PidOrAtom::Atom(a) => Term::Atom(a),
        }
    }
}

/// The local identity a connection presents to its peer, used to fill in
/// and strip elided `node: None` PID/reference fields. Threaded explicitly
/// through [`encode`]/[`decode`] rather than read from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub node: Atom,
    pub creation: u32,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown ETF tag: {0}")]
    UnknownTag(u8),
    #[error("truncated input")]
    TruncatedInput,
    #[error("bad version byte: {0}")]
    BadVersion(u8),
    #[error("failed to decompress term: {0}")]
    DecompressFailed(String),
    #[error("invalid utf-8 atom name")]
    InvalidUtf8,
}

impl From<std::io::Error> for CodecError {
    fn from(_: std::io::Error) -> Self {
        CodecError::TruncatedInput
    }
}

/// Encode a term to a version-tagged byte buffer.
pub fn encode(term: &Term, conn: Option<&ConnectionIdentity>) -> Vec<u8> {
    let mut out = vec![VERSION];
    encode_term(term, conn, &mut out);
    out
}

fn encode_term(term: &Term, conn: Option<&ConnectionIdentity>, out: &mut Vec<u8>) {
    match term {
        Term::Integer(v) => encode_integer(*v, out),
        Term::BigInt(b) => encode_bigint(b, out),
        Term::Float(f) => {
            out.push(NEW_FLOAT);
            let mut buf = [0u8; 8];
            BigEndian::write_f64(&mut buf, *f);
            out.extend_from_slice(&buf);
        }
        Term::Atom(a) => encode_atom(a, out),
        Term::Tuple(elems) => {
            if elems.len() <= 255 {
                out.push(SMALL_TUPLE);
                out.push(elems.len() as u8);
            } else {
                out.push(LARGE_TUPLE);
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, elems.len() as u32);
                out.extend_from_slice(&buf);
            }
            for e in elems {
                encode_term(e, conn, out);
            }
        }
        Term::Nil => out.push(NIL),
        Term::String(bytes) => {
            out.push(STRING);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, bytes.len() as u16);
            out.extend_from_slice(&buf);
            out.extend_from_slice(bytes);
        }
        Term::List(elems, tail) => {
            out.push(LIST);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, elems.len() as u32);
            out.extend_from_slice(&buf);
            for e in elems {
                encode_term(e, conn, out);
            }
            encode_term(tail, conn, out);
        }
        Term::Binary(bytes) => {
            out.push(BINARY);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, bytes.len() as u32);
            out.extend_from_slice(&buf);
            out.extend_from_slice(bytes);
        }
        Term::Map(pairs) => {
            out.push(MAP);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, pairs.len() as u32);
            out.extend_from_slice(&buf);
            for (k, v) in pairs {
                encode_term(k, conn, out);
                encode_term(v, conn, out);
            }
        }
        Term::Pid(p) => encode_pid(p, conn, out),
        Term::Reference(r) => encode_reference(r, conn, out),
    }
}

fn encode_integer(v: i128, out: &mut Vec<u8>) {
    if (0..=255).contains(&v) {
        out.push(SMALL_INTEGER);
        out.push(v as u8);
    } else if (i32::MIN as i128..=i32::MAX as i128).contains(&v) {
        out.push(INTEGER);
        let mut buf = [0u8; 4];
        BigEndian::write_i32(&mut buf, v as i32);
        out.extend_from_slice(&buf);
    } else {
        let negative = v < 0;
        let magnitude = magnitude_bytes(v.unsigned_abs());
        encode_bigint(
            &BigInt {
                negative,
                magnitude,
            },
            out,
        );
    }
}

fn magnitude_bytes(mut v: u128) -> Vec<u8> {
    if v == 0 {
        return vec![0];
    }
    let mut bytes = Vec::new();
    while v > 0 {
        bytes.push((v & 0xff) as u8);
        v >>= 8;
    }
    bytes
}

fn encode_bigint(b: &BigInt, out: &mut Vec<u8>) {
    let mag = trim_trailing_zeros(&b.magnitude);
    if mag.len() <= 255 {
        out.push(SMALL_BIG);
        out.push(mag.len() as u8);
    } else {
        out.push(LARGE_BIG);
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, mag.len() as u32);
        out.extend_from_slice(&buf);
    }
    out.push(if b.negative { 1 } else { 0 });
    out.extend_from_slice(mag);
}

fn trim_trailing_zeros(magnitude: &[u8]) -> &[u8] {
    let mut end = magnitude.len();
    while end > 1 && magnitude[end - 1] == 0 {
        end -= 1;
    }
    &magnitude[..end]
}

fn encode_atom(a: &Atom, out: &mut Vec<u8>) {
    let bytes = a.as_str().as_bytes();
    if bytes.len() <= 255 {
        out.push(SMALL_ATOM_UTF8);
        out.push(bytes.len() as u8);
    } else {
        out.push(ATOM_UTF8);
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, bytes.len() as u16);
        out.extend_from_slice(&buf);
    }
    out.extend_from_slice(bytes);
}

fn encode_pid(p: &Pid, conn: Option<&ConnectionIdentity>, out: &mut Vec<u8>) {
    out.push(NEW_PID);
    let node = resolve_node(&p.node, conn);
    encode_atom(&node, out);
    let mut buf = [0u8; 12];
    BigEndian::write_u32(&mut buf[0..4], p.id);
    BigEndian::write_u32(&mut buf[4..8], p.serial);
    BigEndian::write_u32(&mut buf[8..12], p.creation);
    out.extend_from_slice(&buf);
}

fn encode_reference(r: &Reference, conn: Option<&ConnectionIdentity>, out: &mut Vec<u8>) {
    out.push(NEWER_REFERENCE);
    let mut len_buf = [0u8; 2];
    BigEndian::write_u16(&mut len_buf, r.id.len() as u16);
    out.extend_from_slice(&len_buf);
    let node = resolve_node(&r.node, conn);
    encode_atom(&node, out);
    let mut creation_buf = [0u8; 4];
    BigEndian::write_u32(&mut creation_buf, r.creation);
    out.extend_from_slice(&creation_buf);
    for word in &r.id {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, *word);
        out.extend_from_slice(&buf);
    }
}

fn resolve_node(node: &Option<Atom>, conn: Option<&ConnectionIdentity>) -> Atom {
    match node {
        Some(a) => a.clone(),
        None => conn
            .map(|c| c.node.clone())
            .expect("elided PID/reference node requires an active connection identity"),
    }
}

/// Decode a version-tagged (or compressed-header) byte buffer into a term.
pub fn decode(bytes: &[u8], conn: Option<&ConnectionIdentity>) -> Result<Term, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::TruncatedInput);
    }
    match bytes[0] {
        VERSION => {
            let mut cursor = &bytes[1..];
            decode_term(&mut cursor, conn)
        }
        COMPRESSED => {
            if bytes.len() < 5 {
                return Err(CodecError::TruncatedInput);
            }
            let uncompressed_size = BigEndian::read_u32(&bytes[1..5]) as usize;
            let mut decoder = ZlibDecoder::new(&bytes[5..]);
            let mut inflated = Vec::with_capacity(uncompressed_size);
            decoder
                .read_to_end(&mut inflated)
                .map_err(|e| CodecError::DecompressFailed(e.to_string()))?;
            let mut cursor = &inflated[..];
            decode_term(&mut cursor, conn)
        }
        other => Err(CodecError::BadVersion(other)),
    }
}

/// Decode exactly one version-tagged term from the front of `cursor`,
/// advancing it past the bytes consumed. Used by [`crate::message`] to
/// read a control term and an optional payload term out of the same
/// connected-message frame.
pub fn decode_one(cursor: &mut &[u8], conn: Option<&ConnectionIdentity>) -> Result<Term, CodecError> {
    let tag = take_u8(cursor)?;
    if tag != VERSION {
        return Err(CodecError::BadVersion(tag));
    }
    decode_term(cursor, conn)
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if cursor.len() < n {
        return Err(CodecError::TruncatedInput);
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn take_u8(cursor: &mut &[u8]) -> Result<u8, CodecError> {
    Ok(take(cursor, 1)?[0])
}

fn take_u16(cursor: &mut &[u8]) -> Result<u16, CodecError> {
    Ok(BigEndian::read_u16(take(cursor, 2)?))
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32, CodecError> {
    Ok(BigEndian::read_u32(take(cursor, 4)?))
}

fn decode_term(cursor: &mut &[u8], conn: Option<&ConnectionIdentity>) -> Result<Term, CodecError> {
    let tag = take_u8(cursor)?;
    match tag {
        SMALL_INTEGER => Ok(Term::Integer(take_u8(cursor)? as i128)),
        INTEGER => Ok(Term::Integer(BigEndian::read_i32(take(cursor, 4)?) as i128)),
        NEW_FLOAT => Ok(Term::Float(BigEndian::read_f64(take(cursor, 8)?))),
        FLOAT_OLD => {
            let bytes = take(cursor, 31)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| CodecError::InvalidUtf8)?
                .trim_end_matches('\0');
            s.parse::<f64>()
                .map(Term::Float)
                .map_err(|_| CodecError::TruncatedInput)
        }
        SMALL_BIG | LARGE_BIG => decode_bigint(cursor, tag),
        SMALL_ATOM_UTF8 | ATOM_UTF8 => decode_atom(cursor, tag),
        SMALL_TUPLE => {
            let arity = take_u8(cursor)? as usize;
            decode_tuple(cursor, conn, arity)
        }
        LARGE_TUPLE => {
            let arity = take_u32(cursor)? as usize;
            decode_tuple(cursor, conn, arity)
        }
        NIL => Ok(Term::Nil),
        STRING => {
            let len = take_u16(cursor)? as usize;
            Ok(Term::String(take(cursor, len)?.to_vec()))
        }
        LIST => {
            let len = take_u32(cursor)? as usize;
            let mut elems = Vec::with_capacity(len);
            for _ in 0..len {
                elems.push(decode_term(cursor, conn)?);
            }
            let tail = decode_term(cursor, conn)?;
            Ok(Term::List(elems, Box::new(tail)))
        }
        BINARY => {
            let len = take_u32(cursor)? as usize;
            Ok(Term::Binary(take(cursor, len)?.to_vec()))
        }
        MAP => {
            let arity = take_u32(cursor)? as usize;
            let mut pairs = Vec::with_capacity(arity);
            for _ in 0..arity {
                let k = decode_term(cursor, conn)?;
                let v = decode_term(cursor, conn)?;
                pairs.push((k, v));
            }
            Ok(Term::Map(pairs))
        }
        NEW_PID => decode_pid(cursor, conn),
        NEWER_REFERENCE => decode_reference(cursor, conn),
        other => Err(CodecError::UnknownTag(other)),
    }
}

fn decode_bigint(cursor: &mut &[u8], tag: u8) -> Result<Term, CodecError> {
    let len = if tag == SMALL_BIG {
        take_u8(cursor)? as usize
    } else {
        take_u32(cursor)? as usize
    };
    let negative = take_u8(cursor)? != 0;
    let magnitude = take(cursor, len)?.to_vec();
    if magnitude.len() <= 16 {
        let mut acc: u128 = 0;
        for (i, byte) in magnitude.iter().enumerate() {
            acc |= (*byte as u128) << (8 * i);
        }
        if let Ok(v) = i128::try_from(acc) {
            let v = if negative { -v } else { v };
            return Ok(Term::Integer(v));
        }
    }
    Ok(Term::BigInt(BigInt {
        negative,
        magnitude,
    }))
}

fn decode_atom(cursor: &mut &[u8], tag: u8) -> Result<Term, CodecError> {
    let len = match tag {
        SMALL_ATOM | SMALL_ATOM_UTF8 => take_u8(cursor)? as usize,
        ATOM | ATOM_UTF8 => take_u16(cursor)? as usize,
        _ => unreachable!(),
    };
    let bytes = take(cursor, len)?;
    let s = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
    Ok(Term::Atom(Atom::new(s)))
}

fn decode_tuple(
    cursor: &mut &[u8],
    conn: Option<&ConnectionIdentity>,
    arity: usize,
) -> Result<Term, CodecError> {
    let mut elems = Vec::with_capacity(arity);
    for _ in 0..arity {
        elems.push(decode_term(cursor, conn)?);
    }
    Ok(Term::Tuple(elems))
}

fn decode_pid(cursor: &mut &[u8], conn: Option<&ConnectionIdentity>) -> Result<Term, CodecError> {
    let node_atom = decode_atom_direct(cursor)?;
    let id = take_u32(cursor)?;
    let serial = take_u32(cursor)?;
    let creation = take_u32(cursor)?;
    let node = elide_node(node_atom, creation, conn);
    Ok(Term::Pid(Pid {
        node,
        id,
        serial,
        creation,
    }))
}

fn decode_reference(
    cursor: &mut &[u8],
    conn: Option<&ConnectionIdentity>,
) -> Result<Term, CodecError> {
    let len = take_u16(cursor)? as usize;
    let node_atom = decode_atom_direct(cursor)?;
    let creation = take_u32(cursor)?;
    let mut id = Vec::with_capacity(len);
    for _ in 0..len {
        id.push(take_u32(cursor)?);
    }
    let node = elide_node(node_atom, creation, conn);
    Ok(Term::Reference(Reference {
        node,
        id,
        creation,
    }))
}

/// PID/reference node fields are always plain atoms on the wire (never
/// `SMALL_ATOM`/deprecated variants in practice, but we accept whichever
/// atom tag precedes them).
fn decode_atom_direct(cursor: &mut &[u8]) -> Result<Atom, CodecError> {
    let tag = take_u8(cursor)?;
    match decode_atom(cursor, tag)? {
        Term::Atom(a) => Ok(a),
        _ => unreachable!(),
    }
}

fn elide_node(node: Atom, creation: u32, conn: Option<&ConnectionIdentity>) -> Option<Atom> {
    match conn {
        Some(c) if c.node == node && c.creation == creation => None,
        _ => Some(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integer_round_trip() {
        assert_eq!(decode(&[131, 97, 0xFF], None).unwrap(), Term::Integer(255));
    }

    #[test]
    fn negative_integer_decode() {
        assert_eq!(
            decode(&[131, 98, 0xFF, 0xFF, 0xFC, 0x18], None).unwrap(),
            Term::Integer(-1000)
        );
    }

    #[test]
    fn negative_one_encode() {
        assert_eq!(
            encode(&Term::Integer(-1), None),
            vec![131, 98, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn i32_min_encode() {
        assert_eq!(
            encode(&Term::Integer(-0x8000_0000), None),
            vec![131, 98, 0x80, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn tag_minimality_boundaries() {
        assert_eq!(encode(&Term::Integer(0), None)[1], SMALL_INTEGER);
        assert_eq!(encode(&Term::Integer(255), None)[1], SMALL_INTEGER);
        assert_eq!(encode(&Term::Integer(256), None)[1], INTEGER);
        assert_eq!(encode(&Term::Integer(-1), None)[1], INTEGER);
        assert_eq!(encode(&Term::Integer(i32::MAX as i128), None)[1], INTEGER);
        assert_eq!(
            encode(&Term::Integer(i32::MAX as i128 + 1), None)[1],
            SMALL_BIG
        );
        assert_eq!(
            encode(&Term::Integer(i32::MIN as i128 - 1), None)[1],
            SMALL_BIG
        );
    }

    #[test]
    fn big_integer_round_trip() {
        let huge: i128 = (i32::MAX as i128 + 1) * 1_000_000_000;
        let encoded = encode(&Term::Integer(huge), None);
        assert_eq!(decode(&encoded, None).unwrap(), Term::Integer(huge));
        let neg = -huge;
        let encoded = encode(&Term::Integer(neg), None);
        assert_eq!(decode(&encoded, None).unwrap(), Term::Integer(neg));
    }

    #[test]
    fn float_round_trip_including_signed_zero() {
        for v in [0.0_f64, -0.0, 1.5, -1.5, f64::MIN_POSITIVE, f64::MAX] {
            let encoded = encode(&Term::Float(v), None);
            match decode(&encoded, None).unwrap() {
                Term::Float(got) => assert_eq!(got.to_bits(), v.to_bits()),
                other => panic!("expected float, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_list_is_nil() {
        assert_eq!(Term::list(vec![]), Term::Nil);
        assert_eq!(encode(&Term::Nil, None), vec![131, NIL]);
    }

    #[test]
    fn atom_and_tuple_round_trip() {
        let term = Term::tuple(vec![Term::atom("hello"), Term::Binary(vec![1, 2, 3])]);
        let encoded = encode(&term, None);
        assert_eq!(decode(&encoded, None).unwrap(), term);
    }

    #[test]
    fn pid_elision_round_trips_through_matching_connection() {
        let conn = ConnectionIdentity {
            node: Atom::new("a@localhost"),
            creation: 3,
        };
        let local_pid = Pid {
            node: None,
            id: 1,
            serial: 0,
            creation: 3,
        };
        let encoded = encode(&Term::Pid(local_pid), Some(&conn));
        match decode(&encoded, Some(&conn)).unwrap() {
            Term::Pid(p) => assert_eq!(p.node, None),
            other => panic!("expected pid, got {other:?}"),
        }
    }

    #[test]
    fn pid_not_elided_for_foreign_node() {
        let conn = ConnectionIdentity {
            node: Atom::new("a@localhost"),
            creation: 3,
        };
        let foreign_pid = Pid {
            node: Some(Atom::new("b@localhost")),
            id: 1,
            serial: 0,
            creation: 7,
        };
        let encoded = encode(&Term::Pid(foreign_pid), Some(&conn));
        match decode(&encoded, Some(&conn)).unwrap() {
            Term::Pid(p) => assert_eq!(p.node, Some(Atom::new("b@localhost"))),
            other => panic!("expected pid, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_reported() {
        match decode(&[131, 42], None) {
            Err(CodecError::UnknownTag(42)) => {}
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }

    #[test]
    fn bad_version_is_reported() {
        match decode(&[7, 97, 1], None) {
            Err(CodecError::BadVersion(7)) => {}
            other => panic!("expected BadVersion, got {other:?}"),
        }
    }

    #[test]
    fn deprecated_atom_tags_are_rejected() {
        match decode(&[131, ATOM, 0, 1, b'a'], None) {
            Err(CodecError::UnknownTag(ATOM)) => {}
            other => panic!("expected UnknownTag, got {other:?}"),
        }
        match decode(&[131, SMALL_ATOM, 1, b'a'], None) {
            Err(CodecError::UnknownTag(SMALL_ATOM)) => {}
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }
}
