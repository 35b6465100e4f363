use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, trace, warn};
use std::path::PathBuf;
use std::time::Instant;

mod aggregate;
mod analysis;
mod cluster;
mod entity;
mod output;
mod proximity;
mod temperature;
mod topology;
mod trajectory;

use aggregate::entities_in_clusters;
use analysis::{select_entities, ClusterAnalysis};
use cluster_common::AnalysisConfig;
use output::{write_file, write_histogram_over_time, write_membership, write_report, write_size_distribution};
use output::{LabelTableWriter, TimeSeriesWriter};
use topology::Topology;
use trajectory::open_trajectory;

/// Cluster-size analysis of a particle trajectory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Analysis configuration file (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Worker threads for the proximity pass (overrides the config; 0 = all cores)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Starting Cluster Engine...");
    let mut config = AnalysisConfig::load(&args.config)?;
    if let Some(threads) = args.threads {
        config.clustering.threads = threads;
    }

    if let Err(e) = run(&config) {
        error!("Cluster analysis failed: {:#}", e);
        return Err(e);
    }
    info!("Cluster analysis complete.");
    Ok(())
}

fn run(config: &AnalysisConfig) -> Result<()> {
    let clustering = &config.clustering;
    info!(
        "Mode: {:?} | cutoff {} nm | molecule cutoff {} nm | PBC: {} | skip: {}",
        clustering.mode, clustering.cutoff, clustering.molecule_cutoff, clustering.pbc, clustering.skip
    );
    if config.coarse_cutoff_suppresses_contacts() {
        warn!(
            "molecule_cutoff ({}) is smaller than cutoff ({}); contacts between molecules whose centers are farther apart than molecule_cutoff are never tested.",
            clustering.molecule_cutoff, clustering.cutoff
        );
    }

    // --- Load Topology and First Frame ---
    let topology = config.input.topology.as_ref().map(Topology::load).transpose()?;
    if let Some(topology) = &topology {
        info!("Topology: {} molecules, {} particles.", topology.molecules.len(), topology.particle_count());
    }

    let mut reader = open_trajectory(&config.input.trajectory, config.input.format)?;
    let first = reader
        .next_frame()?
        .with_context(|| format!("Trajectory '{}' contains no frames", config.input.trajectory.display()))?;
    let particles = first.particle_count();

    let entities = select_entities(config, topology.as_ref(), particles)?;
    let mut analysis = ClusterAnalysis::new(config, entities, topology.as_ref(), particles)?;
    info!(
        "Clustering {} entities ({} particles) of a {}-particle trajectory using {} threads.",
        analysis.entities().len(),
        analysis.entities().particle_count(),
        particles,
        analysis.thread_count()
    );

    // --- Frame Loop ---
    let base = &config.output.base_filename;
    let mut series = TimeSeriesWriter::create(format!("{}_timeseries.csv", base))?;
    let mut labels = LabelTableWriter::create(format!("{}_clust_index_time.csv", base))?;

    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    let print_interval_secs = 5.0;
    let mut next = Some(first);

    while let Some(frame) = next {
        let frame_start = Instant::now();
        let record = analysis.process_frame(&frame)?.cloned();
        if let Some(record) = record {
            series.write(&record)?;
            labels.write(record.time, analysis.labeling().labels())?;

            let now = Instant::now();
            if now.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs {
                info!(
                    "Frame {} (t = {:.3}) | Clusters: {} | Largest: {} | Frame Time: {:6.2} ms | Elapsed: {:.2} s",
                    analysis.frames_seen() - 1,
                    record.time,
                    record.cluster_count,
                    record.max_cluster_size,
                    frame_start.elapsed().as_secs_f64() * 1000.0,
                    start_time.elapsed().as_secs_f64()
                );
                previous_print_time = now;
            } else {
                trace!(
                    "Frame {} analysed in {:.2} ms",
                    analysis.frames_seen() - 1,
                    frame_start.elapsed().as_secs_f64() * 1000.0
                );
            }
        }
        next = reader.next_frame()?;
    }

    series.finish()?;
    labels.finish()?;
    info!(
        "Read {} frames, analysed {} in {:.3} seconds.",
        analysis.frames_seen(),
        analysis.frames_analysed(),
        start_time.elapsed().as_secs_f64()
    );

    // --- Trajectory-wide Results ---
    let membership = analysis.membership();
    let report = analysis.finish();

    write_file(format!("{}_histo_clust.csv", base), |w| write_size_distribution(w, &report))?;
    write_file(format!("{}_histo_time.csv", base), |w| write_histogram_over_time(w, &report))?;
    info!("Total number of entities in clusters = {}", entities_in_clusters(&report));
    info!(
        "Raw histogram scale: min {:?}, max {} | weighted: min {:?}, max {} | max size {}",
        report.raw_scale.min_positive,
        report.raw_scale.max,
        report.weighted_scale.min_positive,
        report.weighted_scale.max,
        report.max_size
    );

    match &membership {
        Some(listing) => {
            let filename = format!("{}_maxclust.ndx", base);
            write_file(&filename, |w| write_membership(w, listing, config.output.write_all_clusters))?;
            info!(
                "Largest cluster of the final frame ({} entities, label {}) listed in {}",
                listing.max_cluster.entities.len(),
                listing.max_cluster.label,
                filename
            );
        }
        None => warn!("The final frame has no cluster larger than one entity; skipping the cluster membership listing."),
    }

    let format = config.output.report_format;
    let filename = format!("{}_report.{}", base, format.extension());
    write_file(&filename, |w| write_report(w, &report, format))?;
    info!("Aggregate report saved to {}", filename);

    Ok(())
}
