use std::fmt;

use crate::record::AllocationRecord;
use crate::registry::ThreadRegistry;

/// Streams one allocation record in the report's single-quoted
/// brace/bracket notation.
///
/// The thread name is resolved from the registry at report time; a thread
/// that has already exited (or never named itself) reports as `'?'`.
pub(crate) fn write_record(
    sink: &mut dyn fmt::Write,
    record: &AllocationRecord,
    threads: &ThreadRegistry,
) -> fmt::Result {
    let ledger = threads.find(record.thread_id);
    let thread_name = ledger
        .as_ref()
        .and_then(|ledger| ledger.name.as_deref())
        .unwrap_or("?");

    writeln!(sink, "\t\t{{")?;
    writeln!(sink, "\t\t\t'file': '{}',", record.origin.file())?;
    writeln!(sink, "\t\t\t'line': {},", record.origin.line())?;
    writeln!(
        sink,
        "\t\t\t'thread': [ '{thread_name}', {} ]",
        record.thread_id
    )?;
    writeln!(sink, "\t\t\t'mem': [ {:#x}, {} ]", record.address, record.size)?;
    writeln!(sink, "\t\t}},")
}

#[cfg(test)]
mod tests {
    use std::panic::Location;

    use super::*;
    use crate::record::Liveness;

    #[test]
    fn record_text_carries_origin_and_size() {
        let record = AllocationRecord {
            address: 0x2000,
            size: 96,
            origin: Location::caller(),
            thread_id: 42,
            liveness: Liveness::Live,
        };

        let threads = ThreadRegistry::default();
        let mut text = String::new();
        write_record(&mut text, &record, &threads).unwrap();

        assert!(text.contains("report.rs"));
        assert!(text.contains("0x2000"));
        assert!(text.contains("96"));
        // Thread 42 never registered, so the name falls back.
        assert!(text.contains("'?'"));
    }
}
