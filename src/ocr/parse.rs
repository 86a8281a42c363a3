use std::collections::BTreeMap;

use super::text::join_inline;

const WORD_LEVEL: i32 = 5;

struct Word {
    left: u32,
    text: String,
}

/// Groups tesseract TSV word rows into lines in reading order.
pub(super) fn tsv_lines(tsv: &str) -> Vec<String> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<Word>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        lines.entry(key).or_default().push(Word {
            left: cols[6].parse().unwrap_or(0),
            text: text.to_string(),
        });
    }

    lines
        .into_values()
        .filter_map(|mut words| {
            words.sort_by_key(|word| word.left);
            words
                .into_iter()
                .map(|word| word.text)
                .reduce(|line, word| join_inline(&line, &word))
        })
        .collect()
}
