//! Bakestream CLI - inspect and play back bake containers.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use bakestream::container::{omitted_mips, StreamMask, TableOfContents};
use bakestream::prelude::*;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const READY_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        // Info command - table of contents summary
        "info" | "i" => {
            let Some(path) = filtered_args.get(1) else {
                usage_error("bakestream info <file> [--json]");
            };
            let json = filtered_args.iter().any(|&s| s == "--json" || s == "-j");
            cmd_info(path, json)
        }

        // Frames command - per-frame layout and dependencies
        "frames" | "f" => {
            let Some(path) = filtered_args.get(1) else {
                usage_error("bakestream frames <file>");
            };
            cmd_frames(path)
        }

        // Play command - stream through the sequence
        "play" | "p" => {
            let Some(path) = filtered_args.get(1) else {
                usage_error("bakestream play <file> [--look-ahead N] [--all] [--no-loop] [--fps F] [--options FILE]");
            };
            parse_play_args(&filtered_args[2..]).and_then(|play| cmd_play(path, play))
        }

        // Dump command - one materialized frame
        "dump" | "d" => {
            if filtered_args.len() < 3 {
                usage_error("bakestream dump <file> <frame>");
            }
            match filtered_args[2].parse::<u32>() {
                Ok(frame) => cmd_dump(filtered_args[1], frame),
                Err(_) => usage_error("bakestream dump <file> <frame>"),
            }
        }

        // Help
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        "version" | "--version" | "-V" => {
            println!(
                "bakestream {} (engine {}, built {} {})",
                env!("CARGO_PKG_VERSION"),
                bakestream::engine_version(),
                bakestream::BUILD_DATE,
                bakestream::BUILD_TIME
            );
            Ok(())
        }

        // Default: if file exists, show info; otherwise error
        other => {
            if Path::new(other).exists() {
                cmd_info(other, false)
            } else {
                eprintln!("Unknown command: {}", other);
                eprintln!();
                print_help();
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Stderr logging at `level` unless `RUST_LOG` says otherwise.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bakestream={level},bakestream_cli={level}")));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn usage_error(usage: &str) -> ! {
    eprintln!("Error: missing arguments");
    eprintln!("Usage: {}", usage);
    std::process::exit(1);
}

fn print_help() {
    println!("bakestream - baked animation cache player");
    println!();
    println!("USAGE:");
    println!("    bakestream [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file> [--json]       Show header, meshes and image sequences");
    println!("    f, frames <file>                Show per-frame sizes and dependencies");
    println!("    p, play   <file> [flags]        Stream the sequence and report throughput");
    println!("    d, dump   <file> <frame>        Materialize one frame and print its streams");
    println!("    version                         Show version and build date");
    println!("    h, help                         Show this help");
    println!();
    println!("PLAY FLAGS:");
    println!("    --look-ahead N   Frames buffered ahead of playback (default 20)");
    println!("    --all            Buffer every frame and never evict");
    println!("    --no-loop        Stop at the last frame");
    println!("    --no-mmap        Read through a file handle instead of mapping");
    println!("    --fps F          Playback rate; 0 plays as fast as frames arrive");
    println!("    --cycles N       Passes over the sequence when looping (default 1)");
    println!("    --options FILE   Load player options from JSON");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("EXAMPLES:");
    println!("    bakestream info shot.bake                 # Quick overview");
    println!("    bakestream info shot.bake --json          # Machine-readable info");
    println!("    bakestream frames shot.bake               # Where each frame borrows from");
    println!("    bakestream play shot.bake --fps 24        # Real-time playback");
    println!("    bakestream play shot.bake --all --fps 0   # Load everything, measure");
    println!("    bakestream -v dump shot.bake 12           # Inspect frame 12");
    println!();
    println!("NOTES:");
    println!("    - Passing a file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides -v/-vv/-q");
}

/// Open a player and wait for the table of contents.
fn open_ready(path: &str, options: PlayerOptions) -> anyhow::Result<Player> {
    tracing::info!("Opening container: {}", path);
    let player = Player::open(path, options).with_context(|| format!("Failed to open {}", path))?;
    match player.wait_until_ready(READY_TIMEOUT) {
        PlayerStatus::Ready => Ok(player),
        PlayerStatus::Failed => bail!(
            "Failed to open {}: {}",
            path,
            player.fail_message().unwrap_or_default()
        ),
        PlayerStatus::Initializing => bail!("Timed out reading {}", path),
    }
}

fn cmd_info(path: &str, json: bool) -> anyhow::Result<()> {
    let player = open_ready(path, PlayerOptions::default())?;
    let info = player.playback_info().context("player has no table of contents")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Container: {}", path);
    if let Some(version) = player.file_version() {
        println!("Version: {} (engine {})", version, bakestream::engine_version());
    }
    println!("Source: {}", info.source_file);
    println!("Created: {}", info.creation_date);
    println!(
        "Frames: {} @ {:.2} fps ({:.2}s)",
        info.frame_count, info.frame_rate, info.duration
    );
    println!("16-bit indices forced: {}", info.force_16bit_indices);
    println!();

    println!("Meshes ({}):", info.meshes.len());
    for m in &info.meshes {
        println!(
            "  [{}] {}{} - max {} vertices, {} surfaces",
            m.index,
            m.name,
            if m.constant { " (constant)" } else { "" },
            m.max_vertices,
            m.max_surfaces
        );
        println!(
            "      P:{} N:{} T:{} V:{} UV:{} C:{}",
            m.position_format,
            m.normal_format,
            m.tangent_format,
            m.velocity_format,
            m.texcoord_format,
            m.color_format
        );
    }
    println!();

    println!("Image sequences ({}):", info.image_sequences.len());
    for s in &info.image_sequences {
        println!(
            "  [{}] {}{} - {} {}x{}, {} mips",
            s.index,
            s.name,
            if s.constant { " (constant)" } else { "" },
            s.format,
            s.width,
            s.height,
            s.mip_count
        );
    }

    if !info.optimization_suggestions.is_empty() {
        println!();
        println!("Suggestions:");
        for s in &info.optimization_suggestions {
            println!("  - {}", s);
        }
    }
    Ok(())
}

fn cmd_frames(path: &str) -> anyhow::Result<()> {
    let player = open_ready(path, PlayerOptions::default().look_ahead(1))?;
    let toc = player.table_of_contents().context("player has no table of contents")?;

    println!("Container: {}", path);
    println!();
    println!("{:>6}  {:>10}  {:>10}  {:>6}  omitted", "frame", "offset", "bytes", "deps");
    for (i, frame) in toc.frames.iter().enumerate() {
        println!(
            "{:>6}  {:>10}  {:>10}  {:>6}  {}",
            i,
            toc.frame_data_offset + frame.file_position,
            frame.byte_length,
            frame.dependency,
            describe_omissions(&toc, i)
        );
    }
    println!();
    println!("Total frame data: {} bytes", total_frame_bytes(&toc));
    Ok(())
}

fn describe_omissions(toc: &TableOfContents, frame: usize) -> String {
    let f = &toc.frames[frame];
    if !f.has_omitted_streams {
        return "-".to_string();
    }
    let mut parts = Vec::new();
    for (m, mesh) in f.meshes.iter().enumerate() {
        let omitted = StreamMask::omitted(mesh);
        if !omitted.is_empty() {
            parts.push(format!("mesh{}:{:?}", m, omitted));
        }
    }
    for (i, image) in f.images.iter().enumerate() {
        let mips = omitted_mips(image);
        if mips != 0 {
            parts.push(format!("image{}:mips{:#06b}", i, mips));
        }
    }
    parts.join(" ")
}

fn total_frame_bytes(toc: &TableOfContents) -> u64 {
    toc.frames.iter().map(|f| f.byte_length).sum()
}

struct PlayArgs {
    options: PlayerOptions,
    fps: Option<f32>,
    cycles: u32,
}

fn parse_play_args(args: &[&str]) -> anyhow::Result<PlayArgs> {
    let mut options = PlayerOptions::default();
    let mut fps = None;
    let mut cycles = 1;

    let mut it = args.iter();
    while let Some(&arg) = it.next() {
        let mut value = || it.next().copied().with_context(|| format!("{} needs a value", arg));
        match arg {
            "--options" => options = PlayerOptions::load(value()?)?,
            "--look-ahead" => options.look_ahead = value()?.parse().context("--look-ahead")?,
            "--all" => options.buffer_everything = true,
            "--no-loop" => options.looping = false,
            "--no-mmap" => options.use_mmap = false,
            "--fps" => fps = Some(value()?.parse::<f32>().context("--fps")?),
            "--cycles" => cycles = value()?.parse::<u32>().context("--cycles")?.max(1),
            other => bail!("Unknown play flag: {}", other),
        }
    }
    Ok(PlayArgs { options, fps, cycles })
}

fn cmd_play(path: &str, play: PlayArgs) -> anyhow::Result<()> {
    let looping = play.options.looping;
    let player = open_ready(path, play.options)?;
    let info = player.playback_info().context("player has no table of contents")?;
    let frames = info.frame_count;
    if frames == 0 {
        println!("{}: no frames", path);
        return Ok(());
    }

    let fps = play.fps.unwrap_or(info.frame_rate);
    let interval = (fps > 0.0).then(|| Duration::from_secs_f32(1.0 / fps));
    let cycles = if looping { play.cycles } else { 1 };
    tracing::info!("Playing {} frames x{} at {:.2} fps", frames, cycles, fps);

    let started = Instant::now();
    let mut last_report = started;
    let mut missed = 0u32;
    let mut served = 0u32;
    let mut bytes = 0u64;

    for step in 0..frames.saturating_mul(cycles) {
        let index = step % frames;
        let tick = Instant::now();
        match player.get_frame_at(index, Wait::Blocking) {
            Some(frame) => {
                served += 1;
                bytes += frame.byte_size();
                tracing::trace!(frame = index, bytes = frame.byte_size(), "served");
            }
            None => {
                missed += 1;
                tracing::warn!(frame = index, "frame not available");
                if player.status() == PlayerStatus::Failed {
                    bail!("Playback failed: {}", player.fail_message().unwrap_or_default());
                }
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            print_stats(&player.collect_stats());
            last_report = Instant::now();
        }
        if let Some(interval) = interval {
            if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    let elapsed = started.elapsed();
    println!();
    println!("Served {} frames ({} missed) in {:.2?}", served, missed, elapsed);
    println!(
        "Throughput: {:.1} frames/s, {:.1} MB/s",
        served as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        bytes as f64 / 1_048_576.0 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    print_stats(&player.collect_stats());
    Ok(())
}

fn print_stats(stats: &PlaybackStats) {
    println!(
        "  window [{}..+{}]  {:.1} MB  {} frames/s  {:.1} MB/s  read {:.2?}  process {:.2?}",
        stats.buffered_start,
        stats.buffered_count,
        stats.memory_usage as f64 / 1_048_576.0,
        stats.frames_processed_last_second,
        stats.bytes_read_last_second as f64 / 1_048_576.0,
        stats.avg_read_time,
        stats.avg_process_time
    );
}

fn cmd_dump(path: &str, index: u32) -> anyhow::Result<()> {
    let player = open_ready(path, PlayerOptions::default().look_ahead(1).looping(false))?;
    if index >= player.frame_count() {
        bail!("Frame {} out of range (0..{})", index, player.frame_count());
    }
    let frame: Arc<MaterializedFrame> = player
        .get_frame_at(index, Wait::Blocking)
        .with_context(|| format!("Frame {} not available", index))?;

    println!("Frame {} ({} bytes)", frame.index(), frame.byte_size());
    println!("Read: {:.2?}, process: {:.2?}", frame.read_time(), frame.process_time());
    let borrowed: Vec<String> = frame.borrowed_frames().iter().map(u32::to_string).collect();
    if !borrowed.is_empty() {
        println!("Borrows from frames: {}", borrowed.join(", "));
    }
    println!();

    for (m, mesh) in frame.meshes().iter().enumerate() {
        println!(
            "Mesh {}: {} vertices, {} surfaces, bounds {:?}",
            m, mesh.vertex_count, mesh.surface_count, mesh.bounds
        );
        for (mask, view) in mesh.views() {
            println!(
                "    {:<12} {:>6} x {:<10} from frame {}",
                format!("{:?}", mask),
                view.count(),
                format!("{:?}", view.format()),
                view.source_frame()
            );
        }
        if let Some(p) = mesh.decoded_positions().first() {
            println!("    first position: {:?}", p);
        }
        if !mesh.unresolved.is_empty() {
            println!("    unresolved: {:?}", mesh.unresolved);
        }
    }

    for (i, image) in frame.images().iter().enumerate() {
        println!("Image {}: {} mips", i, image.mip_count);
        for level in 0..image.mip_count as usize {
            match image.mip(level) {
                Some(mip) => println!(
                    "    mip {}: {}x{} pitch {} - {} bytes from frame {}",
                    level,
                    mip.width,
                    mip.height,
                    mip.row_pitch,
                    mip.data.byte_len(),
                    mip.data.source_frame()
                ),
                None => println!("    mip {}: unresolved", level),
            }
        }
    }
    Ok(())
}
