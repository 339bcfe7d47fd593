use super::Section;

fn leading_word(name: &str) -> String {
    name.split_whitespace().next().unwrap_or("").to_lowercase()
}

/// Single left-to-right merge pass.
///
/// A section absorbs its successor when both share a leading label word or
/// either one is shorter than `min_section_length`. A merged pair is not
/// reconsidered against the section after it.
pub fn merge_sections(sections: Vec<Section>, min_section_length: f32) -> Vec<Section> {
    if sections.len() <= 1 {
        return sections;
    }

    let mut processed = Vec::with_capacity(sections.len());
    let mut iter = sections.into_iter().peekable();

    while let Some(mut current) = iter.next() {
        let should_merge = iter.peek().is_some_and(|next| {
            leading_word(&current.name) == leading_word(&next.name)
                || current.duration() < min_section_length
                || next.duration() < min_section_length
        });

        if should_merge {
            if let Some(next) = iter.next() {
                log::debug!("Merging '{}' into '{}'", next.name, current.name);
                current.end = next.end;
                current.confidence = (current.confidence + next.confidence) / 2.0;
            }
        }
        processed.push(current);
    }

    processed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, start: f32, end: f32, confidence: f32) -> Section {
        Section {
            name: name.to_string(),
            start,
            end,
            confidence,
        }
    }

    #[test]
    fn merges_same_label_family() {
        let merged = merge_sections(
            vec![
                section("Intro", 0.0, 10.0, 0.9),
                section("Verse 1", 10.0, 25.0, 0.8),
                section("Verse 2", 25.0, 40.0, 0.6),
                section("Chorus", 40.0, 60.0, 0.7),
            ],
            5.0,
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].name, "Verse 1");
        assert_eq!(merged[1].end, 40.0);
        assert!((merged[1].confidence - 0.7).abs() < 1e-6);
        assert_eq!(merged[2].start, 40.0);
    }

    #[test]
    fn short_sections_merge_forward() {
        let merged = merge_sections(
            vec![
                section("Intro", 0.0, 3.0, 0.9),
                section("Verse 1", 3.0, 20.0, 0.7),
                section("Chorus", 20.0, 40.0, 0.8),
            ],
            5.0,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Intro");
        assert_eq!(merged[0].end, 20.0);
        assert_eq!(merged[1].name, "Chorus");
    }

    #[test]
    fn single_pass_does_not_cascade() {
        let merged = merge_sections(
            vec![
                section("Verse 1", 0.0, 10.0, 0.8),
                section("Verse 2", 10.0, 20.0, 0.8),
                section("Verse 3", 20.0, 30.0, 0.8),
            ],
            5.0,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].end, 20.0);
        assert_eq!(merged[1].name, "Verse 3");
    }

    #[test]
    fn leaves_distinct_sections_alone() {
        let input = vec![
            section("Intro", 0.0, 10.0, 0.9),
            section("Chorus", 10.0, 30.0, 0.8),
        ];
        assert_eq!(merge_sections(input.clone(), 5.0), input);
    }
}
