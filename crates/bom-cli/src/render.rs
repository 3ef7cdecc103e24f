// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Table and JSON rendering for command output.
use std::io::Write;

use anyhow::Result;
use bom_app_core::report::ExecutionTime;
use bom_app_core::StateChangeReport;
use bom_core::{ComputeStats, PartId, PartResult, ShardId};
use bom_shard::Refresh;
use comfy_table::Table;
use serde::Serialize;

#[derive(Serialize)]
struct Written {
    shard: ShardId,
    rows: usize,
}

#[derive(Serialize)]
struct Timings {
    read_secs: f64,
    compute_secs: f64,
    write_secs: f64,
}

#[derive(Serialize)]
struct RefreshDoc<'a> {
    root: &'a PartId,
    dry_run: bool,
    results: &'a [PartResult],
    stats: &'a ComputeStats,
    written: Option<Vec<Written>>,
    timings: Timings,
}

pub fn refresh_table(out: &mut impl Write, refresh: &Refresh) -> Result<()> {
    let computation = &refresh.computation;
    let stats = &computation.stats;

    let mut table = Table::new();
    table.set_header(vec!["partid", "cfp", "hash", "assembler"]);
    for r in &computation.results {
        table.add_row(vec![
            r.partid.to_string(),
            r.cfp.to_string(),
            r.hash.to_hex(),
            r.assembler.to_string(),
        ]);
    }
    writeln!(out, "{table}")?;
    writeln!(
        out,
        "root {}: {} parts, {} induced edges, {} results",
        refresh.root,
        stats.nodes,
        stats.induced_edges,
        computation.results.len()
    )?;
    if stats.missing_co2 + stats.missing_assembler + stats.unparsed_assemblers > 0 {
        writeln!(
            out,
            "missing CO2: {}, missing assembler: {}, unparsed assembler rows: {}",
            stats.missing_co2, stats.missing_assembler, stats.unparsed_assemblers
        )?;
    }
    match &refresh.writes {
        Some(summary) if summary.batches.is_empty() => writeln!(out, "nothing to write")?,
        Some(summary) => {
            for (shard, rows) in &summary.batches {
                writeln!(out, "shard {shard}: {rows} rows written")?;
            }
        }
        None => writeln!(out, "dry run: nothing written")?,
    }
    let t = &refresh.timings;
    writeln!(
        out,
        "read {:.3}s, compute {:.3}s, write {:.3}s",
        t.read.as_secs_f64(),
        t.compute.as_secs_f64(),
        t.write.as_secs_f64()
    )?;
    Ok(())
}

pub fn refresh_json(out: &mut impl Write, refresh: &Refresh) -> Result<()> {
    let doc = RefreshDoc {
        root: &refresh.root,
        dry_run: refresh.writes.is_none(),
        results: &refresh.computation.results,
        stats: &refresh.computation.stats,
        written: refresh.writes.as_ref().map(|summary| {
            summary
                .batches
                .iter()
                .map(|&(shard, rows)| Written { shard, rows })
                .collect()
        }),
        timings: Timings {
            read_secs: refresh.timings.read.as_secs_f64(),
            compute_secs: refresh.timings.compute.as_secs_f64(),
            write_secs: refresh.timings.write.as_secs_f64(),
        },
    };
    serde_json::to_writer_pretty(&mut *out, &doc)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDoc<'a> {
    execution_time: &'a ExecutionTime,
    #[serde(rename = "intermediateDBName")]
    intermediate_db_name: &'a str,
    rollback_gids: &'a [u64],
    replay_gid_count: Option<u64>,
    replace_query: Option<&'a str>,
}

pub fn report_table(
    out: &mut impl Write,
    report: &StateChangeReport,
    query: Option<&str>,
) -> Result<()> {
    let gids: Vec<String> = report.rollback_gids.iter().map(u64::to_string).collect();
    let mut table = Table::new();
    table.set_header(vec!["field", "value"]);
    table.add_row(vec!["executionTime".to_owned(), report.execution_time.to_string()]);
    table.add_row(vec![
        "intermediateDBName".to_owned(),
        report.intermediate_db_name.clone(),
    ]);
    table.add_row(vec![
        "rollbackGids".to_owned(),
        format!("{} [{}]", gids.len(), gids.join(", ")),
    ]);
    table.add_row(vec![
        "replayGidCount".to_owned(),
        report
            .replay_gid_count
            .map_or_else(|| "-".to_owned(), |n| n.to_string()),
    ]);
    table.add_row(vec!["other keys".to_owned(), report.extra.len().to_string()]);
    writeln!(out, "{table}")?;
    match query {
        Some(q) => writeln!(out, "replace query:\n{q}")?,
        None => writeln!(out, "no replace query")?,
    }
    Ok(())
}

pub fn report_json(
    out: &mut impl Write,
    report: &StateChangeReport,
    query: Option<&str>,
) -> Result<()> {
    let doc = ReportDoc {
        execution_time: &report.execution_time,
        intermediate_db_name: &report.intermediate_db_name,
        rollback_gids: &report.rollback_gids,
        replay_gid_count: report.replay_gid_count,
        replace_query: query,
    };
    serde_json::to_writer_pretty(&mut *out, &doc)?;
    writeln!(out)?;
    Ok(())
}
