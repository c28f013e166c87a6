#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::types::{Message, RecordType, RecordTypeWithData, ResourceRecord};

// A record whose rdata was demoted to raw octets (because it did not
// parse to its declared length) is offset-sensitive: the same octets
// may parse differently at their new position after re-encoding.
// The round trip property only covers messages without such records.
fn has_demoted_rdata(rrs: &[ResourceRecord]) -> bool {
    rrs.iter().any(|rr| {
        matches!(
            &rr.rtype_with_data,
            RecordTypeWithData::Uninterpreted { rtype, .. } if matches!(
                rtype,
                RecordType::A
                    | RecordType::AAAA
                    | RecordType::NS
                    | RecordType::CNAME
                    | RecordType::MX
                    | RecordType::SOA
                    | RecordType::SRV
            )
        )
    })
}

fuzz_target!(|data: &[u8]| {
    // a message parsed off the wire may contain compressed names, so
    // re-encoding it is not byte-identical - but it is
    // structure-identical
    if let Ok(message) = Message::from_octets(data) {
        if has_demoted_rdata(&message.answers)
            || has_demoted_rdata(&message.authority)
            || has_demoted_rdata(&message.additional)
        {
            return;
        }

        let serialised = message.clone().to_octets().unwrap();
        let deserialised = Message::from_octets(&serialised);
        assert_eq!(Ok(message), deserialised);
    }
});
