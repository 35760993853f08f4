//! Output formatting for `sealedctl check`.

use std::io::{self, Write};

use crate::sealed::ResolutionTable;

/// Print the label table of `table`, nested hierarchies included, then
/// its default policy.
pub fn print_table<T>(table: &ResolutionTable<T>, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Key:     {}", table.key())?;
    writeln!(out, "Default: {}", table.default_policy().describe())?;

    let mut rows = Vec::new();
    collect_rows(table, "", &mut rows);
    if rows.is_empty() {
        writeln!(out, "No labels declared")?;
        return Ok(());
    }

    writeln!(out, "{:<24} {:<32} KIND", "LABEL", "SUBTYPE")?;
    writeln!(out, "{}", "-".repeat(68))?;
    for row in rows {
        writeln!(out, "{:<24} {:<32} {}", row.label, row.subtype, row.kind)?;
    }
    Ok(())
}

struct Row {
    label: String,
    subtype: String,
    kind: &'static str,
}

fn collect_rows<T>(table: &ResolutionTable<T>, prefix: &str, rows: &mut Vec<Row>) {
    for entry in table.entries() {
        let subtype = format!("{prefix}{}", entry.subtype());
        rows.push(Row {
            label: entry.label().to_string(),
            subtype: subtype.clone(),
            kind: if entry.is_singleton() { "singleton" } else { "adapter" },
        });
        for alternate in entry.alternate_labels() {
            rows.push(Row {
                label: alternate.clone(),
                subtype: subtype.clone(),
                kind: "alternate",
            });
        }
    }
    for nested in table.nested() {
        let prefix = format!("{prefix}{}/", nested.subtype());
        collect_rows(nested.table(), &prefix, rows);
    }
}
