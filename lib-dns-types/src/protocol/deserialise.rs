//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

/// How many compression pointers a single name may follow.  Pointers
/// must also point strictly backwards, so this only exists to cut
/// short maliciously deep (but still backwards) chains.
pub const POINTER_CHAIN_MAX_LEN: usize = 16;

impl Message {
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Self::deserialise(&mut ConsumableBuffer::new(octets))
    }

    /// Read a whole message.  Sections are read in order, with the
    /// header counts giving the lengths.  Trailing octets after the
    /// final record are ignored, but a short read inside any section
    /// is an error.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let wire_header = WireHeader::deserialise(buffer)?;
        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        let mut answers = Vec::with_capacity(wire_header.ancount.into());
        let mut authority = Vec::with_capacity(wire_header.nscount.into());
        let mut additional = Vec::with_capacity(wire_header.arcount.into());

        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(wire_header.header.id, buffer)?);
        }
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(wire_header.header.id, buffer)?);
        }
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(wire_header.header.id, buffer)?);
        }
        for _ in 0..wire_header.arcount {
            additional.push(ResourceRecord::deserialise(wire_header.header.id, buffer)?);
        }

        Ok(Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

impl WireHeader {
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = QueryType::deserialise(id, buffer)?;
        let qclass = QueryClass::deserialise(id, buffer)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl ResourceRecord {
    /// Read a resource record.  The rdata of the types the resolver
    /// interprets is parsed (expanding any compression pointers, which
    /// may point anywhere earlier in the message); if that parse does
    /// not consume exactly RDLENGTH octets the record is kept with its
    /// raw rdata instead.  RDLENGTH running past the end of the
    /// message is fatal.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let rtype = RecordType::deserialise(id, buffer)?;
        let rclass = RecordClass::deserialise(id, buffer)?;
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;

        let rdata_start = buffer.position;
        let raw_rdata = buffer
            .take(rdlength as usize)
            .ok_or(Error::ResourceRecordTooShort(id))?;

        let rtype_with_data =
            match parse_rdata(id, rtype, &mut buffer.at_offset(rdata_start), rdlength) {
                Some(parsed) => parsed,
                None => RecordTypeWithData::Uninterpreted {
                    rtype,
                    octets: raw_rdata.to_vec(),
                },
            };

        Ok(Self {
            name,
            rtype_with_data,
            rclass,
            ttl,
        })
    }
}

/// Typed parse of the rdata, returning `None` if the type is not one
/// the resolver interprets or if the data does not fill its declared
/// length exactly.
fn parse_rdata(
    id: u16,
    rtype: RecordType,
    cursor: &mut ConsumableBuffer,
    rdlength: u16,
) -> Option<RecordTypeWithData> {
    let end = cursor.position + rdlength as usize;

    let parsed = match rtype {
        RecordType::A => RecordTypeWithData::A {
            address: Ipv4Addr::from(cursor.next_u32()?),
        },
        RecordType::AAAA => RecordTypeWithData::AAAA {
            address: Ipv6Addr::new(
                cursor.next_u16()?,
                cursor.next_u16()?,
                cursor.next_u16()?,
                cursor.next_u16()?,
                cursor.next_u16()?,
                cursor.next_u16()?,
                cursor.next_u16()?,
                cursor.next_u16()?,
            ),
        },
        RecordType::NS => RecordTypeWithData::NS {
            nsdname: DomainName::deserialise(id, cursor).ok()?,
        },
        RecordType::CNAME => RecordTypeWithData::CNAME {
            cname: DomainName::deserialise(id, cursor).ok()?,
        },
        RecordType::MX => RecordTypeWithData::MX {
            preference: cursor.next_u16()?,
            exchange: DomainName::deserialise(id, cursor).ok()?,
        },
        RecordType::SOA => RecordTypeWithData::SOA {
            mname: DomainName::deserialise(id, cursor).ok()?,
            rname: DomainName::deserialise(id, cursor).ok()?,
            serial: cursor.next_u32()?,
            refresh: cursor.next_u32()?,
            retry: cursor.next_u32()?,
            expire: cursor.next_u32()?,
            minimum: cursor.next_u32()?,
        },
        RecordType::SRV => RecordTypeWithData::SRV {
            priority: cursor.next_u16()?,
            weight: cursor.next_u16()?,
            port: cursor.next_u16()?,
            target: DomainName::deserialise(id, cursor).ok()?,
        },
        _ => return None,
    };

    (cursor.position == end).then_some(parsed)
}

impl DomainName {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        Self::deserialise_expanding(id, buffer, 0)
    }

    /// Read a domain name, following compression pointers through
    /// `buffer`'s view of the whole message.  A length octet with the
    /// top two bits set introduces a 14 bit pointer; a pointer must
    /// target an offset strictly before the name being read, and at
    /// most `POINTER_CHAIN_MAX_LEN` of them may be chained.  The other
    /// reserved top-bit patterns are rejected.
    fn deserialise_expanding(
        id: u16,
        buffer: &mut ConsumableBuffer,
        chain_len: usize,
    ) -> Result<Self, Error> {
        let mut octets = Vec::<u8>::with_capacity(DOMAINNAME_MAX_LEN);
        let mut labels = Vec::<Vec<u8>>::with_capacity(5);
        let start = buffer.position;

        'outer: loop {
            let size = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;

            if size == 0 {
                octets.push(0);
                break 'outer;
            }

            if usize::from(size) <= LABEL_MAX_LEN {
                octets.push(size);

                if let Some(os) = buffer.take(size as usize) {
                    let mut label = Vec::with_capacity(size.into());
                    for o in os {
                        let lowered = o.to_ascii_lowercase();
                        octets.push(lowered);
                        label.push(lowered);
                    }
                    labels.push(label);
                } else {
                    return Err(Error::DomainTooShort(id));
                }

                if octets.len() > DOMAINNAME_MAX_LEN {
                    break 'outer;
                }
            } else if size & 0b1100_0000 == 0b1100_0000 {
                if chain_len >= POINTER_CHAIN_MAX_LEN {
                    return Err(Error::DomainPointerLimit(id));
                }

                let hi = size & 0b0011_1111;
                let lo = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;
                let ptr = u16::from_be_bytes([hi, lo]).into();

                // pointer must be to an earlier offset (not merely a
                // different one: an earlier one - RFC 1035 section
                // 4.1.4), which also rules out self-reference.
                if ptr >= start {
                    return Err(Error::DomainPointerInvalid(id));
                }

                let mut other =
                    Self::deserialise_expanding(id, &mut buffer.at_offset(ptr), chain_len + 1)?;
                octets.append(&mut other.octets);
                labels.append(&mut other.labels);
                break 'outer;
            } else {
                // top bits 01 and 10 are reserved
                return Err(Error::DomainLabelInvalid(id));
            }
        }

        if octets.len() <= DOMAINNAME_MAX_LEN {
            Ok(DomainName { octets, labels })
        } else {
            Err(Error::DomainTooLong(id))
        }
    }
}

impl QueryType {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl QueryClass {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordType {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordClass {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header - so
/// the failure can be linked back to the query it came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field, or its
    /// RDLENGTH runs past the end of the message.
    ResourceRecordTooShort(u16),

    /// A domain is incomplete.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer points to or after the name it occurs in.
    DomainPointerInvalid(u16),

    /// A domain pointer chain is too deep.
    DomainPointerLimit(u16),

    /// A domain label has a reserved tag in its top two bits.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::ResourceRecordTooShort(id)
            | Error::DomainTooShort(id)
            | Error::DomainTooLong(id)
            | Error::DomainPointerInvalid(id)
            | Error::DomainPointerLimit(id)
            | Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "message too short to contain an ID"),
            Error::HeaderTooShort(_) => write!(f, "header too short"),
            Error::QuestionTooShort(_) => write!(f, "question too short"),
            Error::ResourceRecordTooShort(_) => write!(f, "resource record too short"),
            Error::DomainTooShort(_) => write!(f, "domain name too short"),
            Error::DomainTooLong(_) => write!(f, "domain name too long"),
            Error::DomainPointerInvalid(_) => write!(f, "domain compression pointer invalid"),
            Error::DomainPointerLimit(_) => write!(f, "domain compression pointer chain too deep"),
            Error::DomainLabelInvalid(_) => write!(f, "domain label tag invalid"),
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which will be consumed by the parsing process.
///
/// Name decoding needs access to the whole message to resolve
/// compression pointers, so this holds the full octet slice and a
/// cursor rather than shrinking the slice as it reads.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.octets.len() > self.position {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.octets.len() > self.position + 1 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.octets.len() > self.position + 3 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            let c = self.octets[self.position + 2];
            let d = self.octets[self.position + 3];
            self.position += 4;
            Some(u32::from_be_bytes([a, b, c, d]))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn decode_query() {
        let octets = [
            0, 22, // ID
            1, 0, // flags: RD
            0, 1, // QDCOUNT
            0, 0, // ANCOUNT
            0, 0, // NSCOUNT
            0, 0, // ARCOUNT
            3, b'd', b'n', b's',
            6, b'g', b'o', b'o', b'g', b'l', b'e',
            3, b'c', b'o', b'm',
            0,
            0, 1, // QTYPE
            0, 1, // QCLASS
        ];

        let message = Message::from_octets(&octets).unwrap();

        assert_eq!(22, message.header.id);
        assert!(!message.header.is_response);
        assert!(message.header.recursion_desired);
        assert_eq!(Rcode::NoError, message.header.rcode);
        assert_eq!(
            vec![Question {
                name: domain("dns.google.com"),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            }],
            message.questions
        );
        assert!(message.answers.is_empty());
        assert!(message.authority.is_empty());
        assert!(message.additional.is_empty());
    }

    #[test]
    #[rustfmt::skip]
    fn decode_expands_pointers() {
        // question at offset 12, answer name is a pointer to it
        let octets = [
            0, 22, // ID
            0x81, 0x80, // flags: QR RD RA
            0, 1, // QDCOUNT
            0, 1, // ANCOUNT
            0, 0, // NSCOUNT
            0, 0, // ARCOUNT
            3, b'd', b'n', b's',
            6, b'g', b'o', b'o', b'g', b'l', b'e',
            3, b'c', b'o', b'm',
            0,
            0, 1, // QTYPE
            0, 1, // QCLASS
            0xC0, 0x0C, // NAME: pointer to offset 12
            0, 1, // TYPE
            0, 1, // CLASS
            0, 0, 1, 44, // TTL
            0, 4, // RDLENGTH
            8, 8, 8, 8, // RDATA
        ];

        let message = Message::from_octets(&octets).unwrap();

        assert_eq!(
            vec![ResourceRecord {
                name: domain("dns.google.com"),
                rtype_with_data: RecordTypeWithData::A {
                    address: std::net::Ipv4Addr::new(8, 8, 8, 8),
                },
                rclass: RecordClass::IN,
                ttl: 300,
            }],
            message.answers
        );
    }

    #[test]
    fn decode_rejects_forward_pointer() {
        let mut octets = query_octets();
        // question name becomes a pointer to itself
        octets[12] = 0xC0;
        octets[13] = 0x0C;

        assert_eq!(
            Err(Error::DomainPointerInvalid(22)),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn decode_rejects_reserved_label_tags() {
        for tag in [0b0100_0000u8, 0b1000_0000] {
            let mut octets = query_octets();
            octets[12] = tag | 3;

            assert_eq!(
                Err(Error::DomainLabelInvalid(22)),
                Message::from_octets(&octets)
            );
        }
    }

    #[test]
    fn decode_rejects_deep_pointer_chains() {
        // a name at offset 0, then a run of pointers each pointing to
        // the one before it
        let mut octets = vec![3, b'f', b'o', b'o', 0];
        for i in 0..=POINTER_CHAIN_MAX_LEN {
            let target = if i == 0 { 0 } else { octets.len() - 2 };
            octets.push(0xC0 | u8::try_from(target >> 8).unwrap());
            octets.push(u8::try_from(target & 0xFF).unwrap());
        }

        let last = octets.len() - 2;
        let buffer = ConsumableBuffer::new(&octets);
        assert_eq!(
            Err(Error::DomainPointerLimit(0)),
            DomainName::deserialise(0, &mut buffer.at_offset(last))
        );

        // one link fewer is fine
        let penultimate = last - 2;
        assert_eq!(
            Ok(domain("foo")),
            DomainName::deserialise(0, &mut buffer.at_offset(penultimate))
        );
    }

    #[test]
    fn decode_rejects_rdlength_overrun() {
        let mut octets = answer_octets();
        let len = octets.len();
        octets[len - 6] = 0;
        octets[len - 5] = 200; // RDLENGTH bigger than the buffer

        assert_eq!(
            Err(Error::ResourceRecordTooShort(22)),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn decode_demotes_bad_fixed_size_rdata() {
        let mut octets = answer_octets();
        let len = octets.len();
        // truncate the A rdata to 3 octets
        octets[len - 5] = 3;
        octets.truncate(len - 1);

        let message = Message::from_octets(&octets).unwrap();
        assert_eq!(
            RecordTypeWithData::Uninterpreted {
                rtype: RecordType::A,
                octets: vec![8, 8, 8],
            },
            message.answers[0].rtype_with_data
        );
    }

    #[test]
    fn decode_ignores_trailing_octets() {
        let mut octets = query_octets();
        octets.extend([1, 2, 3, 4]);

        let message = Message::from_octets(&octets).unwrap();
        assert_eq!(1, message.questions.len());
    }

    #[rustfmt::skip]
    fn query_octets() -> Vec<u8> {
        vec![
            0, 22,
            1, 0,
            0, 1,
            0, 0,
            0, 0,
            0, 0,
            3, b'd', b'n', b's',
            6, b'g', b'o', b'o', b'g', b'l', b'e',
            3, b'c', b'o', b'm',
            0,
            0, 1,
            0, 1,
        ]
    }

    #[rustfmt::skip]
    fn answer_octets() -> Vec<u8> {
        vec![
            0, 22,
            0x80, 0,
            0, 0,
            0, 1,
            0, 0,
            0, 0,
            3, b'd', b'n', b's',
            6, b'g', b'o', b'o', b'g', b'l', b'e',
            3, b'c', b'o', b'm',
            0,
            0, 1, // TYPE
            0, 1, // CLASS
            0, 0, 1, 44, // TTL
            0, 4, // RDLENGTH
            8, 8, 8, 8,
        ]
    }
}
