//! Minimal protobuf wire-format reader for the pprof `Profile` message.
//!
//! Only the message shapes attribution consumes are decoded; unknown fields
//! are skipped by wire type. Repeated scalar fields accept both packed and
//! unpacked encodings, since Go's runtime emits packed but the format allows
//! either.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::{Function, Line, Location, Profile, ProfileError, Sample, ValueType};

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_BYTES: u32 = 2;
const WIRE_FIXED32: u32 = 5;

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, ProfileError> {
        let b = *self.buf.get(self.pos).ok_or(ProfileError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64, ProfileError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.byte()?;
            if shift < 64 {
                value |= u64::from(b & 0x7f) << shift;
            }
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn tag(&mut self) -> Result<(u32, u32), ProfileError> {
        let key = self.varint()?;
        Ok(((key >> 3) as u32, (key & 0x7) as u32))
    }

    fn bytes(&mut self) -> Result<&'a [u8], ProfileError> {
        let len = self.varint()? as usize;
        let end = self.pos.checked_add(len).ok_or(ProfileError::Truncated)?;
        if end > self.buf.len() {
            return Err(ProfileError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, wire: u32, field: u32) -> Result<(), ProfileError> {
        match wire {
            WIRE_VARINT => {
                self.varint()?;
            }
            WIRE_FIXED64 => {
                self.pos = self
                    .pos
                    .checked_add(8)
                    .filter(|&p| p <= self.buf.len())
                    .ok_or(ProfileError::Truncated)?;
            }
            WIRE_BYTES => {
                self.bytes()?;
            }
            WIRE_FIXED32 => {
                self.pos = self
                    .pos
                    .checked_add(4)
                    .filter(|&p| p <= self.buf.len())
                    .ok_or(ProfileError::Truncated)?;
            }
            other => return Err(ProfileError::WireType(other, field)),
        }
        Ok(())
    }
}

/// Read a repeated integer field that may be packed or unpacked.
fn repeated_u64(r: &mut Reader, wire: u32, out: &mut Vec<u64>) -> Result<(), ProfileError> {
    if wire == WIRE_BYTES {
        let mut packed = Reader::new(r.bytes()?);
        while !packed.done() {
            out.push(packed.varint()?);
        }
    } else {
        out.push(r.varint()?);
    }
    Ok(())
}

fn repeated_i64(r: &mut Reader, wire: u32, out: &mut Vec<i64>) -> Result<(), ProfileError> {
    if wire == WIRE_BYTES {
        let mut packed = Reader::new(r.bytes()?);
        while !packed.done() {
            out.push(packed.varint()? as i64);
        }
    } else {
        out.push(r.varint()? as i64);
    }
    Ok(())
}

fn decode_value_type(buf: &[u8]) -> Result<(i64, i64), ProfileError> {
    let mut r = Reader::new(buf);
    let (mut kind, mut unit) = (0i64, 0i64);
    while !r.done() {
        let (field, wire) = r.tag()?;
        match field {
            1 => kind = r.varint()? as i64,
            2 => unit = r.varint()? as i64,
            _ => r.skip(wire, field)?,
        }
    }
    Ok((kind, unit))
}

fn decode_sample(buf: &[u8]) -> Result<Sample, ProfileError> {
    let mut r = Reader::new(buf);
    let mut sample = Sample::default();
    while !r.done() {
        let (field, wire) = r.tag()?;
        match field {
            1 => repeated_u64(&mut r, wire, &mut sample.location_ids)?,
            2 => repeated_i64(&mut r, wire, &mut sample.values)?,
            _ => r.skip(wire, field)?,
        }
    }
    Ok(sample)
}

fn decode_line(buf: &[u8]) -> Result<Line, ProfileError> {
    let mut r = Reader::new(buf);
    let mut line = Line::default();
    while !r.done() {
        let (field, wire) = r.tag()?;
        match field {
            1 => line.function_id = r.varint()?,
            2 => line.line = r.varint()? as i64,
            _ => r.skip(wire, field)?,
        }
    }
    Ok(line)
}

fn decode_location(buf: &[u8]) -> Result<Location, ProfileError> {
    let mut r = Reader::new(buf);
    let mut loc = Location::default();
    while !r.done() {
        let (field, wire) = r.tag()?;
        match field {
            1 => loc.id = r.varint()?,
            3 => loc.address = r.varint()?,
            4 => loc.lines.push(decode_line(r.bytes()?)?),
            _ => r.skip(wire, field)?,
        }
    }
    Ok(loc)
}

struct RawFunction {
    id: u64,
    name: i64,
    filename: i64,
    start_line: i64,
}

fn decode_function(buf: &[u8]) -> Result<RawFunction, ProfileError> {
    let mut r = Reader::new(buf);
    let mut func = RawFunction {
        id: 0,
        name: 0,
        filename: 0,
        start_line: 0,
    };
    while !r.done() {
        let (field, wire) = r.tag()?;
        match field {
            1 => func.id = r.varint()?,
            2 => func.name = r.varint()? as i64,
            4 => func.filename = r.varint()? as i64,
            5 => func.start_line = r.varint()? as i64,
            _ => r.skip(wire, field)?,
        }
    }
    Ok(func)
}

fn string_at(table: &[String], index: i64) -> Result<String, ProfileError> {
    let index = index as usize;
    table
        .get(index)
        .cloned()
        .ok_or(ProfileError::BadStringIndex(index))
}

pub(crate) fn decode_profile(data: &[u8]) -> Result<Profile, ProfileError> {
    // Profiles written by `go test` are gzipped; uncompressed input is also
    // accepted since pprof itself allows both.
    let mut plain;
    let buf = if data.starts_with(&[0x1f, 0x8b]) {
        plain = Vec::new();
        GzDecoder::new(data).read_to_end(&mut plain)?;
        plain.as_slice()
    } else {
        data
    };

    let mut r = Reader::new(buf);
    let mut strings: Vec<String> = Vec::new();
    let mut sample_types: Vec<(i64, i64)> = Vec::new();
    let mut raw_functions: Vec<RawFunction> = Vec::new();
    let mut profile = Profile::default();

    while !r.done() {
        let (field, wire) = r.tag()?;
        match field {
            1 => sample_types.push(decode_value_type(r.bytes()?)?),
            2 => profile.samples.push(decode_sample(r.bytes()?)?),
            4 => profile.locations.push(decode_location(r.bytes()?)?),
            5 => raw_functions.push(decode_function(r.bytes()?)?),
            6 => {
                let s = std::str::from_utf8(r.bytes()?).map_err(|_| ProfileError::BadString)?;
                strings.push(s.to_owned());
            }
            9 => profile.time_nanos = r.varint()? as i64,
            10 => profile.duration_nanos = r.varint()? as i64,
            _ => r.skip(wire, field)?,
        }
    }

    for (kind, unit) in sample_types {
        profile.sample_types.push(ValueType {
            kind: string_at(&strings, kind)?,
            unit: string_at(&strings, unit)?,
        });
    }
    for raw in raw_functions {
        profile.functions.push(Function {
            id: raw.id,
            name: string_at(&strings, raw.name)?,
            filename: string_at(&strings, raw.filename)?,
            start_line: raw.start_line,
        });
    }
    Ok(profile)
}

#[cfg(test)]
mod test {
    use super::*;

    /// Append one varint-encoded value.
    fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
        loop {
            let b = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                buf.push(b);
                return;
            }
            buf.push(b | 0x80);
        }
    }

    fn put_tag(buf: &mut Vec<u8>, field: u32, wire: u32) {
        put_varint(buf, u64::from(field << 3 | wire));
    }

    fn put_bytes(buf: &mut Vec<u8>, field: u32, data: &[u8]) {
        put_tag(buf, field, WIRE_BYTES);
        put_varint(buf, data.len() as u64);
        buf.extend_from_slice(data);
    }

    /// Hand-encode a two-frame single-sample profile:
    /// main (line 10) -> work (line 20), 5ms of cpu time.
    fn tiny_profile() -> Vec<u8> {
        let mut st = Vec::new();
        put_tag(&mut st, 1, WIRE_VARINT);
        put_varint(&mut st, 1); // "cpu"
        put_tag(&mut st, 2, WIRE_VARINT);
        put_varint(&mut st, 2); // "nanoseconds"

        let mut sample = Vec::new();
        let mut locs = Vec::new();
        put_varint(&mut locs, 2); // leaf: work
        put_varint(&mut locs, 1); // root: main
        put_bytes(&mut sample, 1, &locs);
        let mut values = Vec::new();
        put_varint(&mut values, 5_000_000);
        put_bytes(&mut sample, 2, &values);

        let mut line_main = Vec::new();
        put_tag(&mut line_main, 1, WIRE_VARINT);
        put_varint(&mut line_main, 1);
        put_tag(&mut line_main, 2, WIRE_VARINT);
        put_varint(&mut line_main, 10);
        let mut loc_main = Vec::new();
        put_tag(&mut loc_main, 1, WIRE_VARINT);
        put_varint(&mut loc_main, 1);
        put_bytes(&mut loc_main, 4, &line_main);

        let mut line_work = Vec::new();
        put_tag(&mut line_work, 1, WIRE_VARINT);
        put_varint(&mut line_work, 2);
        put_tag(&mut line_work, 2, WIRE_VARINT);
        put_varint(&mut line_work, 20);
        let mut loc_work = Vec::new();
        put_tag(&mut loc_work, 1, WIRE_VARINT);
        put_varint(&mut loc_work, 2);
        put_bytes(&mut loc_work, 4, &line_work);

        let mut fn_main = Vec::new();
        put_tag(&mut fn_main, 1, WIRE_VARINT);
        put_varint(&mut fn_main, 1);
        put_tag(&mut fn_main, 2, WIRE_VARINT);
        put_varint(&mut fn_main, 3); // "main"
        put_tag(&mut fn_main, 4, WIRE_VARINT);
        put_varint(&mut fn_main, 5); // "main.go"
        let mut fn_work = Vec::new();
        put_tag(&mut fn_work, 1, WIRE_VARINT);
        put_varint(&mut fn_work, 2);
        put_tag(&mut fn_work, 2, WIRE_VARINT);
        put_varint(&mut fn_work, 4); // "work"
        put_tag(&mut fn_work, 4, WIRE_VARINT);
        put_varint(&mut fn_work, 5);

        let mut p = Vec::new();
        put_bytes(&mut p, 1, &st);
        put_bytes(&mut p, 2, &sample);
        put_bytes(&mut p, 4, &loc_main);
        put_bytes(&mut p, 4, &loc_work);
        put_bytes(&mut p, 5, &fn_main);
        put_bytes(&mut p, 5, &fn_work);
        for s in ["", "cpu", "nanoseconds", "main", "work", "main.go"] {
            put_bytes(&mut p, 6, s.as_bytes());
        }
        put_tag(&mut p, 10, WIRE_VARINT);
        put_varint(&mut p, 100_000_000);
        p
    }

    #[test]
    fn decodes_tiny_profile() {
        let prof = Profile::parse(&tiny_profile()).unwrap();
        assert_eq!(prof.duration_nanos, 100_000_000);
        assert_eq!(prof.sample_types.len(), 1);
        assert_eq!(prof.sample_types[0].unit, "nanoseconds");
        assert_eq!(prof.weight_index(), 0);
        assert_eq!(prof.samples.len(), 1);
        assert_eq!(prof.samples[0].location_ids, vec![2, 1]);
        assert_eq!(prof.samples[0].values, vec![5_000_000]);
        assert_eq!(prof.locations.len(), 2);
        assert_eq!(prof.functions[1].name, "work");
        assert_eq!(prof.functions[1].filename, "main.go");
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut p = tiny_profile();
        // period_type (field 11, bytes) and period (field 12, varint)
        put_bytes(&mut p, 11, &[0x08, 0x01]);
        put_tag(&mut p, 12, WIRE_VARINT);
        put_varint(&mut p, 250_000);
        let prof = Profile::parse(&p).unwrap();
        assert_eq!(prof.samples.len(), 1);
    }

    #[test]
    fn truncated_input_errors() {
        let p = tiny_profile();
        assert_matches::assert_matches!(
            Profile::parse(&p[..p.len() - 3]),
            Err(ProfileError::Truncated)
        );
    }
}
