//! Alignment annotation.
//!
//! All rows with a non-empty query go to the [`Mapper`] in one batch keyed by
//! row id. The best alignment per row is then summarised into columns:
//!
//! | Column | Aligned | Unaligned |
//! |--------|---------|-----------|
//! | `{aligned}` | `true` | `false` |
//! | `_alignment` | best alignment | null |
//! | `_target` | target name | `""` |
//! | `_cigar` | `cs` string | `""` |
//! | `_n_trimmed_query_start` and the other three trims | count | `-1` |
//! | `_n_additional` | count | `-1` |
//! | `_n_additional_difftarget` | count | `-1` |
//! | `_target_variant` | variant label | `""` |
//! | `_substitutions`, `_insertions`, `_deletions` | lists | empty |

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use super::AnnotateError;
use crate::align::{
    AlignError, Alignment, Mapper, MutationCaller, Mutations, TargetIsoforms, TargetVariantCaller,
};
use crate::core::read::{qvals_column, NAME_COLUMN};
use crate::core::table::{Column, ColumnData, Table};
use crate::core::types::Strand;
use crate::utils::validation::{ensure_column, ensure_no_collisions, ensure_unique};

/// Count reported for rows without an alignment
pub const UNALIGNED_COUNT: i64 = -1;

const TRIM_SUFFIXES: [&str; 4] = ["query_start", "query_end", "target_start", "target_end"];
const MUTATION_SUFFIXES: [&str; 3] = ["substitutions", "insertions", "deletions"];

/// Which columns an alignment adds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignOptions {
    pub add_alignment: bool,
    pub add_target: bool,
    pub add_cigar: bool,
    pub add_n_trimmed: bool,
    pub add_n_additional: bool,
    pub add_n_additional_difftarget: bool,
    /// Replace existing columns instead of failing
    pub overwrite: bool,
    /// Keep the aligner's raw output here
    pub paf_file: Option<PathBuf>,
    /// Column holding the unique row id sent to the aligner
    pub id_column: String,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            add_alignment: true,
            add_target: true,
            add_cigar: true,
            add_n_trimmed: true,
            add_n_additional: true,
            add_n_additional_difftarget: true,
            overwrite: true,
            paf_file: None,
            id_column: NAME_COLUMN.to_string(),
        }
    }
}

/// Optional callers applied to each alignment
#[derive(Clone, Copy, Default)]
pub struct AlignHooks<'a> {
    pub target_variants: Option<&'a dyn TargetVariantCaller>,
    pub mutations: Option<&'a dyn MutationCaller>,
}

impl std::fmt::Debug for AlignHooks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignHooks")
            .field("target_variants", &self.target_variants.is_some())
            .field("mutations", &self.mutations.is_some())
            .finish()
    }
}

/// Per-row result
enum RowAlignment {
    Unaligned,
    Aligned {
        alignment: Arc<Alignment>,
        n_difftarget: usize,
        variant: Option<String>,
        mutations: Option<Mutations>,
    },
}

/// Align `query_column` of every row and add the alignment columns.
///
/// Rows with an empty query are not sent to the aligner and come back
/// unaligned. If a target variant caller is configured it runs first and its
/// adjusted alignment feeds the mutation caller and every derived column.
///
/// # Errors
///
/// Returns an error if the query or id column is missing, ids repeat, an
/// output column exists and `overwrite` is off, a variant caller needs
/// qualities and `{query_column}_qvals` is missing, the aligner fails, an
/// alignment is on the reverse strand, or a hook fails.
pub fn align_seqs(
    table: &Table,
    mapper: &dyn Mapper,
    query_column: &str,
    aligned_column: &str,
    options: &AlignOptions,
    hooks: AlignHooks<'_>,
) -> Result<Table, AnnotateError> {
    let queries = table.text(query_column)?;
    let ids = table.text(&options.id_column)?;
    ensure_unique(table, &options.id_column)?;

    let names = output_names(aligned_column, options, hooks);
    ensure_no_collisions(table, &names, options.overwrite)?;

    let qualities = match hooks.target_variants {
        Some(caller) if caller.requires_qualities() => {
            let qvals = qvals_column(query_column);
            ensure_column(table, &qvals)?;
            Some(table.qualities(&qvals)?)
        }
        _ => None,
    };

    let batch: Vec<(String, String)> = ids
        .iter()
        .zip(queries)
        .filter(|(_, query)| !query.is_empty())
        .map(|(id, query)| (id.clone(), query.clone()))
        .collect();

    debug!(
        column = query_column,
        rows = table.n_rows(),
        queries = batch.len(),
        "Aligning"
    );
    let alignments = mapper.map(&batch, options.paf_file.as_deref())?;
    let isoforms = mapper.target_isoforms();

    let rows = ids
        .par_iter()
        .enumerate()
        .map(|(row, id)| {
            let Some(alignment) = alignments.get(id) else {
                return Ok(RowAlignment::Unaligned);
            };
            let quals = qualities.map(|q| q[row].as_slice());
            align_row(id, alignment, quals, isoforms, hooks)
        })
        .collect::<Result<Vec<_>, AlignError>>()?;

    let n_aligned = rows
        .iter()
        .filter(|r| matches!(r, RowAlignment::Aligned { .. }))
        .count();
    info!(
        column = query_column,
        rows = rows.len(),
        aligned = n_aligned,
        "Aligned reads"
    );

    let columns = build_columns(aligned_column, options, hooks, &rows);
    debug_assert_eq!(columns.len(), names.len());
    Ok(table.with_columns(columns, options.overwrite)?)
}

fn align_row(
    id: &str,
    alignment: &Alignment,
    qualities: Option<&[u8]>,
    isoforms: &TargetIsoforms,
    hooks: AlignHooks<'_>,
) -> Result<RowAlignment, AlignError> {
    if alignment.strand == Strand::Reverse {
        return Err(AlignError::ReverseStrand {
            query: id.to_string(),
        });
    }

    let (variant, alignment) = match hooks.target_variants {
        Some(caller) => {
            let (variant, adjusted) = caller.call(alignment, qualities)?;
            (Some(variant), adjusted)
        }
        None => (None, alignment.clone()),
    };

    let mutations = hooks
        .mutations
        .map(|caller| caller.call(&alignment))
        .transpose()?;

    Ok(RowAlignment::Aligned {
        n_difftarget: alignment.n_additional_difftarget(isoforms),
        alignment: Arc::new(alignment),
        variant,
        mutations,
    })
}

fn output_names(aligned: &str, options: &AlignOptions, hooks: AlignHooks<'_>) -> Vec<String> {
    let mut names = vec![aligned.to_string()];
    let mut add = |enabled: bool, suffix: &str| {
        if enabled {
            names.push(format!("{aligned}_{suffix}"));
        }
    };

    add(options.add_alignment, "alignment");
    add(options.add_target, "target");
    add(options.add_cigar, "cigar");
    for suffix in TRIM_SUFFIXES {
        add(options.add_n_trimmed, &format!("n_trimmed_{suffix}"));
    }
    add(options.add_n_additional, "n_additional");
    add(options.add_n_additional_difftarget, "n_additional_difftarget");
    add(hooks.target_variants.is_some(), "target_variant");
    for suffix in MUTATION_SUFFIXES {
        add(hooks.mutations.is_some(), suffix);
    }

    names
}

fn to_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn build_columns(
    aligned: &str,
    options: &AlignOptions,
    hooks: AlignHooks<'_>,
    rows: &[RowAlignment],
) -> Vec<Column> {
    let named = |suffix: &str| format!("{aligned}_{suffix}");
    let aligned_rows = || {
        rows.iter().map(|r| match r {
            RowAlignment::Aligned { alignment, .. } => Some(alignment.as_ref()),
            RowAlignment::Unaligned => None,
        })
    };
    let counts = |f: &dyn Fn(&Alignment) -> usize| -> ColumnData {
        ColumnData::Int(
            aligned_rows()
                .map(|a| a.map_or(UNALIGNED_COUNT, |a| to_count(f(a))))
                .collect(),
        )
    };
    let texts = |f: &dyn Fn(&Alignment) -> String| -> ColumnData {
        ColumnData::Text(aligned_rows().map(|a| a.map_or_else(String::new, f)).collect())
    };

    let mut columns = vec![Column::new(
        aligned,
        ColumnData::Bool(aligned_rows().map(|a| a.is_some()).collect()),
    )];

    if options.add_alignment {
        columns.push(Column::new(
            named("alignment"),
            ColumnData::Alignment(
                rows.iter()
                    .map(|r| match r {
                        RowAlignment::Aligned { alignment, .. } => Some(Arc::clone(alignment)),
                        RowAlignment::Unaligned => None,
                    })
                    .collect(),
            ),
        ));
    }
    if options.add_target {
        columns.push(Column::new(named("target"), texts(&|a: &Alignment| a.target.clone())));
    }
    if options.add_cigar {
        columns.push(Column::new(named("cigar"), texts(&|a: &Alignment| a.cigar_str.clone())));
    }
    if options.add_n_trimmed {
        let trims: [(&str, fn(&Alignment) -> usize); 4] = [
            (TRIM_SUFFIXES[0], Alignment::n_trimmed_query_start),
            (TRIM_SUFFIXES[1], Alignment::n_trimmed_query_end),
            (TRIM_SUFFIXES[2], Alignment::n_trimmed_target_start),
            (TRIM_SUFFIXES[3], Alignment::n_trimmed_target_end),
        ];
        for (suffix, trim) in trims {
            columns.push(Column::new(
                named(&format!("n_trimmed_{suffix}")),
                counts(&trim),
            ));
        }
    }
    if options.add_n_additional {
        columns.push(Column::new(
            named("n_additional"),
            counts(&|a: &Alignment| a.additional.len()),
        ));
    }
    if options.add_n_additional_difftarget {
        columns.push(Column::new(
            named("n_additional_difftarget"),
            ColumnData::Int(
                rows.iter()
                    .map(|r| match r {
                        RowAlignment::Aligned { n_difftarget, .. } => to_count(*n_difftarget),
                        RowAlignment::Unaligned => UNALIGNED_COUNT,
                    })
                    .collect(),
            ),
        ));
    }
    if hooks.target_variants.is_some() {
        columns.push(Column::new(
            named("target_variant"),
            ColumnData::Text(
                rows.iter()
                    .map(|r| match r {
                        RowAlignment::Aligned { variant, .. } => variant.clone().unwrap_or_default(),
                        RowAlignment::Unaligned => String::new(),
                    })
                    .collect(),
            ),
        ));
    }
    if hooks.mutations.is_some() {
        for (kind, suffix) in MUTATION_SUFFIXES.iter().enumerate() {
            columns.push(Column::new(
                named(suffix),
                ColumnData::List(
                    rows.iter()
                        .map(|r| match r {
                            RowAlignment::Aligned {
                                mutations: Some(m), ..
                            } => m.lists()[kind].clone(),
                            _ => Vec::new(),
                        })
                        .collect(),
                ),
            ));
        }
    }

    columns
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::align::mutations::CsMutationCaller;
    use crate::align::testing::{alignment, StaticMapper};
    use crate::core::table::TableError;

    fn table(rows: &[(&str, &str)]) -> Table {
        Table::new(vec![
            Column::new(
                "name",
                ColumnData::Text(rows.iter().map(|(n, _)| (*n).to_string()).collect()),
            ),
            Column::new(
                "gene",
                ColumnData::Text(rows.iter().map(|(_, s)| (*s).to_string()).collect()),
            ),
        ])
        .unwrap()
    }

    fn mapper() -> StaticMapper {
        let mut trimmed = alignment("geneA", 10);
        trimmed.q_st = 2;
        trimmed.q_len = 12;
        trimmed.q_en = 11;
        trimmed.r_st = 1;
        trimmed.cigar_str = ":9".to_string();
        trimmed.additional = vec![alignment("geneA_v2", 10), alignment("geneB", 10)];

        let mut isoforms = TargetIsoforms::new();
        isoforms.add_group(["geneA", "geneA_v2"]);

        StaticMapper {
            isoforms,
            ..StaticMapper::default()
        }
        .with("ACGTACGTAC", alignment("geneA", 10))
        .with("TTACGTACGTAC", trimmed)
    }

    #[test]
    fn test_aligned_and_unaligned_rows() {
        let table = table(&[("r1", "ACGTACGTAC"), ("r2", ""), ("r3", "TTACGTACGTAC"), ("r4", "GGGG")]);
        let mapper = mapper();
        let out = align_seqs(
            &table,
            &mapper,
            "gene",
            "gene_aligned",
            &AlignOptions::default(),
            AlignHooks::default(),
        )
        .unwrap();

        assert_eq!(out.bools("gene_aligned").unwrap(), &[true, false, true, false]);
        assert_eq!(out.text("gene_aligned_target").unwrap(), &["geneA", "", "geneA", ""]);
        assert_eq!(out.text("gene_aligned_cigar").unwrap(), &[":10", "", ":9", ""]);

        let ints = |name: &str| out.column(name).unwrap().as_ints().unwrap().to_vec();
        assert_eq!(ints("gene_aligned_n_trimmed_query_start"), vec![0, -1, 2, -1]);
        assert_eq!(ints("gene_aligned_n_trimmed_query_end"), vec![0, -1, 1, -1]);
        assert_eq!(ints("gene_aligned_n_trimmed_target_start"), vec![0, -1, 1, -1]);
        assert_eq!(ints("gene_aligned_n_trimmed_target_end"), vec![0, -1, 0, -1]);
        assert_eq!(ints("gene_aligned_n_additional"), vec![0, -1, 2, -1]);
        assert_eq!(ints("gene_aligned_n_additional_difftarget"), vec![0, -1, 1, -1]);

        let alignments = out.alignments("gene_aligned_alignment").unwrap();
        assert!(alignments[0].is_some() && alignments[1].is_none());
    }

    #[test]
    fn test_single_batch_without_empty_queries() {
        let table = table(&[("r1", "ACGTACGTAC"), ("r2", ""), ("r3", "GGGG")]);
        let mapper = mapper();
        align_seqs(
            &table,
            &mapper,
            "gene",
            "gene_aligned",
            &AlignOptions::default(),
            AlignHooks::default(),
        )
        .unwrap();

        assert_eq!(mapper.calls.load(Ordering::SeqCst), 1);
        let batch = mapper.last_batch.lock().unwrap().clone();
        let ids: Vec<&str> = batch.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
    }

    #[test]
    fn test_column_order_with_mutations() {
        let table = table(&[("r1", "ACGTACGTAC")]);
        let mapper = mapper();
        let hooks = AlignHooks {
            mutations: Some(&CsMutationCaller),
            ..AlignHooks::default()
        };
        let out = align_seqs(&table, &mapper, "gene", "g", &AlignOptions::default(), hooks).unwrap();

        assert_eq!(
            &out.column_names()[2..],
            &[
                "g",
                "g_alignment",
                "g_target",
                "g_cigar",
                "g_n_trimmed_query_start",
                "g_n_trimmed_query_end",
                "g_n_trimmed_target_start",
                "g_n_trimmed_target_end",
                "g_n_additional",
                "g_n_additional_difftarget",
                "g_substitutions",
                "g_insertions",
                "g_deletions",
            ]
        );
        assert!(out.column("g_substitutions").unwrap().as_lists().unwrap()[0].is_empty());
    }

    struct RenamingCaller;

    impl TargetVariantCaller for RenamingCaller {
        fn requires_qualities(&self) -> bool {
            true
        }

        fn call(
            &self,
            alignment: &Alignment,
            qualities: Option<&[u8]>,
        ) -> Result<(String, Alignment), AlignError> {
            let label = if qualities.is_some_and(|q| q.iter().all(|&v| v >= 30)) {
                "wildtype"
            } else {
                "lowqual"
            };
            let mut adjusted = alignment.clone();
            adjusted.cigar_str = format!(":{}", adjusted.r_en - adjusted.r_st);
            adjusted.target = format!("{}_{label}", alignment.target);
            Ok((label.to_string(), adjusted))
        }
    }

    #[test]
    fn test_target_variants_adjust_alignment() {
        let base = table(&[("r1", "ACGTACGTAC"), ("r2", "GGGG")]);
        let with_quals = base
            .with_columns(
                vec![Column::new(
                    "gene_qvals",
                    ColumnData::Qualities(vec![vec![40; 10], vec![40; 4]]),
                )],
                false,
            )
            .unwrap();
        let mapper = mapper();
        let hooks = AlignHooks {
            target_variants: Some(&RenamingCaller),
            mutations: Some(&CsMutationCaller),
        };

        let out = align_seqs(&with_quals, &mapper, "gene", "g", &AlignOptions::default(), hooks)
            .unwrap();
        assert_eq!(out.text("g_target_variant").unwrap(), &["wildtype", ""]);
        assert_eq!(out.text("g_target").unwrap(), &["geneA_wildtype", ""]);

        let err = align_seqs(&base, &mapper, "gene", "g", &AlignOptions::default(), hooks)
            .unwrap_err();
        assert!(matches!(err, AnnotateError::Table(TableError::MissingColumn(c)) if c == "gene_qvals"));
    }

    #[test]
    fn test_reverse_strand_is_fatal() {
        let mut reverse = alignment("geneA", 4);
        reverse.strand = Strand::Reverse;
        let mapper = StaticMapper::default().with("GGGG", reverse);

        let err = align_seqs(
            &table(&[("r1", "GGGG")]),
            &mapper,
            "gene",
            "g",
            &AlignOptions::default(),
            AlignHooks::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotateError::Align(AlignError::ReverseStrand { .. })));
    }

    #[test]
    fn test_duplicate_ids_are_fatal() {
        let err = align_seqs(
            &table(&[("r1", "A"), ("r1", "C")]),
            &mapper(),
            "gene",
            "g",
            &AlignOptions::default(),
            AlignHooks::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotateError::Table(TableError::DuplicateId { .. })));
    }

    #[test]
    fn test_collision_without_overwrite() {
        let table = table(&[("r1", "ACGTACGTAC")]);
        let options = AlignOptions {
            overwrite: false,
            ..AlignOptions::default()
        };
        let once = align_seqs(&table, &mapper(), "gene", "g", &options, AlignHooks::default()).unwrap();
        assert!(matches!(
            align_seqs(&once, &mapper(), "gene", "g", &options, AlignHooks::default()),
            Err(AnnotateError::Table(TableError::ColumnCollision(_)))
        ));

        // Default options overwrite
        let again =
            align_seqs(&once, &mapper(), "gene", "g", &AlignOptions::default(), AlignHooks::default())
                .unwrap();
        assert_eq!(again.n_columns(), once.n_columns());
    }
}
