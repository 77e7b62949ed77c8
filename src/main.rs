use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use avatar_retarget::blendshape::BlendShapeSink;
use avatar_retarget::config::Config;
use avatar_retarget::ik::IkSolver;
use avatar_retarget::landmark::{LandmarkAdapter, PacketMailbox};
use avatar_retarget::osc::OscSink;
use avatar_retarget::pipeline::AvatarRetargeter;
use avatar_retarget::server::{self, Ingress};
use avatar_retarget::skeleton::SkeletonRig;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::load_or_default(CONFIG_PATH);

    println!("Avatar Retarget ({})", env!("GIT_VERSION"));
    println!("Listen: {}", config.server.listen_addr);
    println!("Target FPS: {}", config.app.target_fps);
    println!("Adapter: mirror={}, flip_y={}", config.adapter.mirror, config.adapter.flip_y);
    println!("Smooth: position={}, rotation={}, finger={}",
        config.smooth.position, config.smooth.rotation, config.smooth.finger);
    println!();

    let mut rig = match &config.rig.path {
        Some(path) => {
            let rig = SkeletonRig::load(path)?;
            println!("Rig: {} ({} bones)", path, rig.bone_count());
            rig
        }
        None => {
            println!("Rig: standard T-pose");
            SkeletonRig::standard()
        }
    };

    let mut osc = if config.osc.enabled {
        let sink = OscSink::new(&config.osc.addr)?;
        println!("OSC target: {}", sink.target_addr());
        Some(sink)
    } else {
        println!("OSC target: (disabled)");
        None
    };

    let mailbox = Arc::new(PacketMailbox::new());
    // 起動時点でリグは読み込み済み
    let ingress = Arc::new(Ingress::new(
        LandmarkAdapter::from_config(&config.adapter),
        Arc::clone(&mailbox),
        true,
    ));
    let loop_ingress = Arc::clone(&ingress);

    let listen_addr: SocketAddr = config.server.listen_addr.parse()
        .context("invalid listen_addr")?;
    let ingress_thread = std::thread::spawn(move || -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start tokio runtime")?;
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind(listen_addr)
                .await
                .with_context(|| format!("Failed to bind {}", listen_addr))?;
            log::info!("Listening on {}", listen_addr);
            server::serve(listener, ingress).await
        })
    });

    let mut retargeter = AvatarRetargeter::new(&config);
    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);

    // FPS計測
    let mut frame_count = 0u32;
    let mut output_count = 0u32;
    let mut fps_timer = Instant::now();
    let mut last_published = 0u64;
    let mut last_overwritten = 0u64;

    loop {
        let loop_start = Instant::now();

        if ingress_thread.is_finished() {
            break;
        }

        let calibrating = loop_ingress.take_asset_loaded();
        if calibrating {
            retargeter.on_asset_loaded();
        }

        let writes = loop_ingress.take_expression_writes();
        if !writes.is_empty() {
            retargeter.write_named(writes.iter().map(|(name, value)| (name.as_str(), *value)));
        }

        let output = retargeter.tick(&rig, &mailbox);
        if calibrating {
            loop_ingress.report_calibration(retargeter.is_ready());
        }
        if let Some(out) = output {
            if let Some(osc) = osc.as_mut() {
                if let Err(e) = osc.submit(&out.targets) {
                    log::debug!("{:#}", e);
                }
                if let Err(e) = osc.write(&out.blend_shapes) {
                    log::debug!("{:#}", e);
                }
            }
            if !out.blend_shapes.is_empty() {
                loop_ingress.publish_snapshot(
                    retargeter.read_named().into_iter().map(|(name, value)| (name.to_string(), value)).collect(),
                );
            }
            // 外部ソルバーの代わりに簡易追従させる
            rig.follow(&out.targets);
            output_count += 1;
        }
        retargeter.late_update(&mut rig);

        frame_count += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let published = mailbox.published_count();
            let overwritten = mailbox.overwritten_count();
            println!("FPS: {:.1} (out: {}) | packets {} (dropped {}){}",
                frame_count as f32 / elapsed,
                output_count,
                published - last_published,
                overwritten - last_overwritten,
                if retargeter.is_ready() { " [CAL]" } else { "" });
            last_published = published;
            last_overwritten = overwritten;
            frame_count = 0;
            output_count = 0;
            fps_timer = Instant::now();
        }

        if let Some(remaining) = frame_duration.checked_sub(loop_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    retargeter.teardown(&mailbox);
    println!("Shutting down...");
    match ingress_thread.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("ingress thread panicked"),
    }
}
