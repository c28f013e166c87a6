use fake::{Fake, Faker};

use dns_types::protocol::deserialise::ConsumableBuffer;
use dns_types::protocol::serialise::WritableBuffer;
use dns_types::protocol::types::*;

#[test]
fn roundtrip_message() {
    for _ in 0..100 {
        let original = arbitrary_message();
        let deserialised = Message::from_octets(&original.clone().to_octets().unwrap());

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_header() {
    for _ in 0..100 {
        let original = arbitrary_wireheader();

        let mut buffer = WritableBuffer::default();
        original.header.serialise(&mut buffer);
        buffer.write_u16(original.qdcount);
        buffer.write_u16(original.ancount);
        buffer.write_u16(original.nscount);
        buffer.write_u16(original.arcount);
        let deserialised = WireHeader::deserialise(&mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_question() {
    for _ in 0..100 {
        let original = arbitrary_question();

        let mut buffer = WritableBuffer::default();
        original.clone().serialise(&mut buffer);
        let deserialised = Question::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_resourcerecord() {
    for _ in 0..100 {
        let original = arbitrary_resourcerecord();

        let mut buffer = WritableBuffer::default();
        original.clone().serialise(&mut buffer).unwrap();
        let deserialised =
            ResourceRecord::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_domainname() {
    for _ in 0..100 {
        let original = arbitrary_domainname();

        let mut buffer = WritableBuffer::default();
        original.clone().serialise(&mut buffer);
        let deserialised = DomainName::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

fn arbitrary_message() -> Message {
    let qdcount = (0..10).fake::<usize>();
    let ancount = (0..10).fake::<usize>();
    let nscount = (0..10).fake::<usize>();
    let arcount = (0..10).fake::<usize>();

    let mut questions = Vec::with_capacity(qdcount);
    let mut answers = Vec::with_capacity(ancount);
    let mut authority = Vec::with_capacity(nscount);
    let mut additional = Vec::with_capacity(arcount);

    for _ in 0..qdcount {
        questions.push(arbitrary_question());
    }
    for _ in 0..ancount {
        answers.push(arbitrary_resourcerecord());
    }
    for _ in 0..nscount {
        authority.push(arbitrary_resourcerecord());
    }
    for _ in 0..arcount {
        additional.push(arbitrary_resourcerecord());
    }

    Message {
        header: arbitrary_wireheader().header,
        questions,
        answers,
        authority,
        additional,
    }
}

fn arbitrary_wireheader() -> WireHeader {
    WireHeader {
        header: Header {
            id: Faker.fake(),
            is_response: Faker.fake(),
            opcode: arbitrary_opcode(),
            is_authoritative: Faker.fake(),
            is_truncated: Faker.fake(),
            recursion_desired: Faker.fake(),
            recursion_available: Faker.fake(),
            rcode: arbitrary_rcode(),
        },
        qdcount: Faker.fake(),
        ancount: Faker.fake(),
        nscount: Faker.fake(),
        arcount: Faker.fake(),
    }
}

fn arbitrary_question() -> Question {
    Question {
        name: arbitrary_domainname(),
        qtype: Faker.fake::<u16>().into(),
        qclass: Faker.fake::<u16>().into(),
    }
}

fn arbitrary_resourcerecord() -> ResourceRecord {
    ResourceRecord {
        name: arbitrary_domainname(),
        rtype_with_data: arbitrary_recordtypewithdata(),
        rclass: Faker.fake::<u16>().into(),
        ttl: Faker.fake(),
    }
}

// this must only generate states which deserialisation can also
// reach: uninterpreted rdata only for the types whose rdata really is
// kept uninterpreted
fn arbitrary_recordtypewithdata() -> RecordTypeWithData {
    match (0..8).fake::<u8>() {
        0 => RecordTypeWithData::A {
            address: Faker.fake::<u32>().into(),
        },
        1 => RecordTypeWithData::AAAA {
            address: Faker.fake::<u128>().into(),
        },
        2 => RecordTypeWithData::NS {
            nsdname: arbitrary_domainname(),
        },
        3 => RecordTypeWithData::CNAME {
            cname: arbitrary_domainname(),
        },
        4 => RecordTypeWithData::MX {
            preference: Faker.fake(),
            exchange: arbitrary_domainname(),
        },
        5 => RecordTypeWithData::SOA {
            mname: arbitrary_domainname(),
            rname: arbitrary_domainname(),
            serial: Faker.fake(),
            refresh: Faker.fake(),
            retry: Faker.fake(),
            expire: Faker.fake(),
            minimum: Faker.fake(),
        },
        6 => RecordTypeWithData::SRV {
            priority: Faker.fake(),
            weight: Faker.fake(),
            port: Faker.fake(),
            target: arbitrary_domainname(),
        },
        _ => RecordTypeWithData::Uninterpreted {
            rtype: RecordType::from(if (0..2).fake::<u8>() == 0 { 16 } else { 9999 }),
            octets: arbitrary_octets((0..64).fake()),
        },
    }
}

fn arbitrary_domainname() -> DomainName {
    let num_labels = (1..5).fake::<usize>();
    let mut labels = Vec::<Vec<u8>>::new();
    let mut octets = Vec::<u8>::new();

    for _ in 0..num_labels {
        let label_len = (1..63).fake();
        let mut label = Vec::with_capacity(label_len as usize);
        octets.push(label_len);

        for _ in 0..label_len {
            let octet = Faker.fake::<u8>().to_ascii_lowercase();
            label.push(octet);
            octets.push(octet);
        }

        labels.push(label);
    }

    octets.push(0);

    DomainName { labels, octets }
}

fn arbitrary_opcode() -> Opcode {
    // opcode is a 4-bit field
    (Faker.fake::<u8>() & 0b0000_1111).into()
}

fn arbitrary_rcode() -> Rcode {
    // rcode is a 4-bit field
    (Faker.fake::<u8>() & 0b0000_1111).into()
}

fn arbitrary_octets(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(Faker.fake());
    }
    out
}
