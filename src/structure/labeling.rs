use super::Section;
use crate::audio::features::{FeatureSet, Matrix};

/// Chroma bins with a mean activation above this count towards complexity
const ACTIVE_CHROMA: f32 = 0.1;
const STABLE_HARMONY: f32 = 0.7;
const SHORT_SECTION: f32 = 12.0;
const HIGH_ENERGY_STD_FACTOR: f32 = 0.5;

const BASE_CONFIDENCE: f32 = 0.5;
const MAX_CONFIDENCE: f32 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
}

/// Content statistics of one segment between two boundaries.
#[derive(Debug, Clone)]
pub struct SegmentStats {
    pub start: f32,
    pub end: f32,
    pub duration: f32,
    pub position_ratio: f32,
    pub energy_mean: f32,
    pub energy_variance: f32,
    /// Number of chroma bins whose mean activation exceeds `ACTIVE_CHROMA`
    pub complexity: f32,
    /// `1 / (1 + chroma standard deviation)`. Not the variance: max-normalised
    /// chroma has variance <= 0.25, which would pin this above 0.8.
    pub stability: f32,
    pub brightness: f32,
    pub timbral_variation: f32,
    pub spectral_centroid: f32,
    pub spectral_rolloff: f32,
}

/// Track-wide statistics over all segments, for relative comparisons.
#[derive(Debug, Clone)]
pub struct TrackStats {
    pub energy_mean: f32,
    pub energy_std: f32,
    pub complexity_mean: f32,
    pub energy_variance_mean: f32,
}

impl TrackStats {
    fn from_segments(segments: &[SegmentStats]) -> Self {
        let n = segments.len().max(1) as f32;
        let energy_mean = segments.iter().map(|s| s.energy_mean).sum::<f32>() / n;
        let energy_std = (segments
            .iter()
            .map(|s| (s.energy_mean - energy_mean).powi(2))
            .sum::<f32>()
            / n)
            .sqrt();
        Self {
            energy_mean,
            energy_std,
            complexity_mean: segments.iter().map(|s| s.complexity).sum::<f32>() / n,
            energy_variance_mean: segments.iter().map(|s| s.energy_variance).sum::<f32>() / n,
        }
    }
}

/// What the labelling rules see for one segment.
pub struct SegmentContext<'a> {
    pub stats: &'a SegmentStats,
    pub track: &'a TrackStats,
    pub is_last: bool,
}

impl SegmentContext<'_> {
    fn ratio(&self) -> f32 {
        self.stats.position_ratio
    }

    pub fn is_high_energy(&self) -> bool {
        self.stats.energy_mean > self.track.energy_mean + HIGH_ENERGY_STD_FACTOR * self.track.energy_std
    }

    pub fn is_complex(&self) -> bool {
        self.stats.complexity > self.track.complexity_mean
    }

    pub fn is_stable(&self) -> bool {
        self.stats.stability > STABLE_HARMONY
    }

    pub fn is_short(&self) -> bool {
        self.stats.duration < SHORT_SECTION
    }
}

/// One row of the labelling decision table.
pub struct LabelRule {
    pub name: &'static str,
    pub kind: SectionKind,
    pub applies: fn(&SegmentContext) -> bool,
}

/// Evaluated top to bottom; the first rule that applies names the segment.
pub static LABEL_RULES: [LabelRule; 7] = [
    LabelRule {
        name: "intro-position",
        kind: SectionKind::Intro,
        applies: |ctx| ctx.ratio() < 0.1,
    },
    LabelRule {
        name: "outro-position",
        kind: SectionKind::Outro,
        applies: |ctx| ctx.ratio() > 0.9 || (ctx.is_last && ctx.ratio() > 0.85),
    },
    LabelRule {
        name: "loud-complex-chorus",
        kind: SectionKind::Chorus,
        applies: |ctx| ctx.is_high_energy() && ctx.is_complex() && !ctx.is_short(),
    },
    LabelRule {
        name: "short-unstable-bridge",
        kind: SectionKind::Bridge,
        applies: |ctx| {
            ctx.is_short() && ctx.stats.stability < STABLE_HARMONY && ctx.ratio() > 0.3 && ctx.ratio() < 0.8
        },
    },
    LabelRule {
        name: "early-verse",
        kind: SectionKind::Verse,
        applies: |ctx| ctx.ratio() < 0.6 && !ctx.is_high_energy(),
    },
    LabelRule {
        name: "quiet-verse",
        kind: SectionKind::Verse,
        applies: |ctx| !ctx.is_high_energy(),
    },
    LabelRule {
        name: "loud-chorus",
        kind: SectionKind::Chorus,
        applies: |_| true,
    },
];

pub struct ConfidenceBonus {
    pub bonus: f32,
    pub applies: fn(&SegmentContext, SectionKind) -> bool,
}

/// Added to `BASE_CONFIDENCE` when they apply; the sum is capped at `MAX_CONFIDENCE`.
pub const CONFIDENCE_BONUSES: [ConfidenceBonus; 4] = [
    ConfidenceBonus {
        bonus: 0.3,
        applies: |ctx, kind| match kind {
            SectionKind::Intro => ctx.ratio() < 0.15,
            SectionKind::Outro => ctx.ratio() > 0.85,
            _ => false,
        },
    },
    ConfidenceBonus {
        bonus: 0.2,
        applies: |ctx, kind| match kind {
            SectionKind::Chorus => ctx.is_high_energy(),
            SectionKind::Verse => !ctx.is_high_energy(),
            SectionKind::Bridge => ctx.is_short(),
            _ => false,
        },
    },
    ConfidenceBonus {
        bonus: 0.1,
        applies: |ctx, _| ctx.is_stable(),
    },
    ConfidenceBonus {
        bonus: 0.1,
        applies: |ctx, _| ctx.stats.energy_variance < ctx.track.energy_variance_mean,
    },
];

/// First rule in `LABEL_RULES` that applies to `ctx`.
pub fn matching_rule(ctx: &SegmentContext) -> Option<&'static LabelRule> {
    LABEL_RULES.iter().find(|rule| (rule.applies)(ctx))
}

pub fn classify(ctx: &SegmentContext) -> SectionKind {
    matching_rule(ctx).map_or(SectionKind::Verse, |rule| rule.kind)
}

pub fn score_confidence(ctx: &SegmentContext, kind: SectionKind) -> f32 {
    let bonus: f32 = CONFIDENCE_BONUSES
        .iter()
        .filter(|b| (b.applies)(ctx, kind))
        .map(|b| b.bonus)
        .sum();
    (BASE_CONFIDENCE + bonus).clamp(0.0, MAX_CONFIDENCE)
}

/// Label every segment between consecutive boundaries.
pub fn label_sections(boundaries: &[f32], features: &FeatureSet) -> Vec<Section> {
    if boundaries.len() < 2 || features.n_frames() == 0 {
        return Vec::new();
    }
    let total_duration = boundaries[boundaries.len() - 1];

    let segments: Vec<SegmentStats> = boundaries
        .windows(2)
        .map(|w| segment_stats(features, w[0], w[1], total_duration))
        .collect();
    let track = TrackStats::from_segments(&segments);

    let mut verse_count = 0;
    let sections: Vec<Section> = segments
        .iter()
        .enumerate()
        .map(|(i, stats)| {
            let ctx = SegmentContext {
                stats,
                track: &track,
                is_last: i == segments.len() - 1,
            };
            let rule = matching_rule(&ctx);
            let kind = rule.map_or(SectionKind::Verse, |r| r.kind);
            let name = match kind {
                SectionKind::Verse => {
                    verse_count += 1;
                    format!("Verse {}", verse_count)
                }
                other => format!("{:?}", other),
            };
            let confidence = score_confidence(&ctx, kind);
            log::debug!(
                "{:>7.2}-{:>7.2}s {:<8} [{}] energy={:.4} complexity={} stability={:.2} brightness={:.1} timbre_var={:.2} centroid={:.0}Hz rolloff={:.0}Hz",
                stats.start,
                stats.end,
                name,
                rule.map_or("fallback", |r| r.name),
                stats.energy_mean,
                stats.complexity,
                stats.stability,
                stats.brightness,
                stats.timbral_variation,
                stats.spectral_centroid,
                stats.spectral_rolloff
            );
            Section {
                name,
                start: stats.start,
                end: stats.end,
                confidence,
            }
        })
        .collect();

    log::info!("Labeled {} sections", sections.len());
    sections
}

/// Index of the frame whose time is closest to `t` (earliest on ties).
pub fn nearest_frame(frame_times: &[f32], t: f32) -> usize {
    let idx = frame_times.partition_point(|&ft| ft < t);
    if idx == 0 {
        return 0;
    }
    if idx >= frame_times.len() {
        return frame_times.len() - 1;
    }
    if (frame_times[idx] - t).abs() < (t - frame_times[idx - 1]).abs() {
        idx
    } else {
        idx - 1
    }
}

fn mean_variance(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance)
}

fn matrix_mean_variance(matrix: &Matrix) -> (f32, f32) {
    let values: Vec<f32> = matrix.rows().iter().flatten().copied().collect();
    mean_variance(&values)
}

pub fn segment_stats(features: &FeatureSet, start: f32, end: f32, total_duration: f32) -> SegmentStats {
    let n = features.n_frames();
    let start_frame = nearest_frame(&features.frame_times, start).min(n - 1);
    let end_frame = nearest_frame(&features.frame_times, end).clamp(start_frame + 1, n);

    let energy = features.energy.slice_columns(start_frame, end_frame);
    let (energy_mean, energy_variance) = mean_variance(energy.row(0));

    let chroma = features.chroma.slice_columns(start_frame, end_frame);
    let complexity = chroma
        .row_means(0, chroma.n_cols())
        .iter()
        .filter(|&&m| m > ACTIVE_CHROMA)
        .count() as f32;
    let (_, chroma_variance) = matrix_mean_variance(&chroma);
    let stability = 1.0 / (1.0 + chroma_variance.sqrt());

    let timbral = features.timbral.slice_columns(start_frame, end_frame);
    let brightness = mean_variance(timbral.row(0)).0;
    let timbral_variation = timbral
        .rows()
        .iter()
        .map(|row| mean_variance(row).1.sqrt())
        .sum::<f32>()
        / timbral.n_rows().max(1) as f32;

    let spectral = features.spectral.row_means(start_frame, end_frame);

    SegmentStats {
        start,
        end,
        duration: end - start,
        position_ratio: if total_duration > 0.0 { start / total_duration } else { 0.0 },
        energy_mean,
        energy_variance,
        complexity,
        stability,
        brightness,
        timbral_variation,
        spectral_centroid: spectral[0],
        spectral_rolloff: spectral[1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::{N_CHROMA, N_RHYTHM, N_SPECTRAL, N_TIMBRAL};

    const FRAME: f32 = 0.5;

    /// 60 s at 0.5 s frames; energy and chroma given per frame time.
    fn features(energy: impl Fn(f32) -> f32, chroma: impl Fn(f32, usize) -> f32) -> FeatureSet {
        let n = 120;
        let times: Vec<f32> = (0..n).map(|i| i as f32 * FRAME).collect();
        let chroma_rows = (0..N_CHROMA)
            .map(|bin| times.iter().map(|&t| chroma(t, bin)).collect())
            .collect();
        FeatureSet::new(
            Matrix::from_rows(chroma_rows),
            Matrix::zeros(N_TIMBRAL, n),
            Matrix::zeros(N_SPECTRAL, n),
            Matrix::from_rows(vec![times.iter().map(|&t| energy(t)).collect()]),
            Matrix::zeros(N_RHYTHM, n),
            times,
            120.0,
            Vec::new(),
            false,
        )
        .unwrap()
    }

    fn song() -> FeatureSet {
        features(
            |t| match t {
                t if t < 10.0 => 0.1,
                t if t < 25.0 => 0.2,
                // pulsing around 0.8
                t if t < 40.0 => {
                    if ((t / FRAME) as usize) % 2 == 0 { 0.7 } else { 0.9 }
                }
                t if t < 50.0 => 0.2,
                _ => 0.1,
            },
            |t, bin| {
                if (25.0..40.0).contains(&t) {
                    0.5
                } else if (40.0..50.0).contains(&t) {
                    // alternating full / empty frames: busy and unstable
                    if ((t / FRAME) as usize) % 2 == 0 { 1.0 } else { 0.0 }
                } else if bin == 0 {
                    1.0
                } else {
                    0.0
                }
            },
        )
    }

    #[test]
    fn labels_song_shape() {
        let sections = label_sections(&[0.0, 10.0, 25.0, 40.0, 50.0, 60.0], &song());
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Intro", "Verse 1", "Chorus", "Bridge", "Verse 2"]);
        for s in &sections {
            assert!(s.confidence >= 0.5 && s.confidence <= 0.99);
        }
        assert!(sections.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn final_segment_near_end_is_outro() {
        let sections = label_sections(&[0.0, 10.0, 25.0, 40.0, 55.0, 60.0], &song());
        assert_eq!(sections.last().unwrap().name, "Outro");
    }

    #[test]
    fn confidence_is_capped() {
        let sections = label_sections(&[0.0, 10.0, 25.0, 40.0, 50.0, 60.0], &song());
        // intro: position +0.3, stable +0.1, steady energy +0.1
        assert!((sections[0].confidence - 0.99).abs() < 1e-6);
    }

    #[test]
    fn rule_table_order_matters() {
        let stats = SegmentStats {
            start: 0.0,
            end: 20.0,
            duration: 20.0,
            position_ratio: 0.0,
            energy_mean: 1.0,
            energy_variance: 0.0,
            complexity: 12.0,
            stability: 0.9,
            brightness: 0.0,
            timbral_variation: 0.0,
            spectral_centroid: 0.0,
            spectral_rolloff: 0.0,
        };
        let track = TrackStats {
            energy_mean: 0.2,
            energy_std: 0.1,
            complexity_mean: 3.0,
            energy_variance_mean: 0.1,
        };
        let ctx = SegmentContext { stats: &stats, track: &track, is_last: false };
        // loud and complex, but at the very start: intro wins
        assert_eq!(classify(&ctx), SectionKind::Intro);
        assert_eq!(matching_rule(&ctx).map(|r| r.name), Some("intro-position"));

        let later = SegmentStats { position_ratio: 0.5, start: 30.0, ..stats };
        let ctx = SegmentContext { stats: &later, track: &track, is_last: false };
        assert_eq!(classify(&ctx), SectionKind::Chorus);
        assert_eq!(matching_rule(&ctx).map(|r| r.name), Some("loud-complex-chorus"));
        assert!((score_confidence(&ctx, SectionKind::Chorus) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn stability_uses_chroma_spread() {
        // one active bin out of 12: variance 11/144, std ~0.276
        let f = features(|_| 0.5, |_, bin| if bin == 0 { 1.0 } else { 0.0 });
        let stats = segment_stats(&f, 0.0, 20.0, 60.0);
        let std = (11.0f32 / 144.0).sqrt();
        assert!((stats.stability - 1.0 / (1.0 + std)).abs() < 1e-4);
        assert!(stats.stability < STABLE_HARMONY + 0.1);
    }

    #[test]
    fn nearest_frame_lookup() {
        let times = [0.0, 0.5, 1.0, 1.5];
        assert_eq!(nearest_frame(&times, -1.0), 0);
        assert_eq!(nearest_frame(&times, 0.7), 1);
        assert_eq!(nearest_frame(&times, 0.8), 2);
        assert_eq!(nearest_frame(&times, 0.75), 1);
        assert_eq!(nearest_frame(&times, 9.0), 3);
    }
}
