use crate::backend::LoggingBackend;
use anyhow::Result;
use sonarch::math::Vec3;
use sonarch::request::{RequestCategory, RequestEcho};
use sonarch::{
    AudioRequest, AudioThread, BackendRegistry, ControlsData, ListenerRequest, ObjectRequest,
    PreloadDefinition, RequestFilter, SonarchModule, SonarchSystemDesc, StaticControlsSource,
    StaticHost, SwapOutcome, SystemEvent, SystemEventDispatcher, Transformation,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const EVENT_LENGTH: Duration = Duration::from_millis(300);

fn controls() -> StaticControlsSource {
    StaticControlsSource::new()
        .with_folder(
            "audio",
            ControlsData::new()
                .trigger("play_music")
                .trigger("footstep")
                .rtpc("speed")
                .switch("surface", &["grass", "stone"]),
            vec![PreloadDefinition::new("global_atl_preloads", true).entry("music.bank")],
        )
        .with_folder(
            "audio/levels/harbor",
            ControlsData::new().trigger("seagulls").environment("warehouse"),
            vec![PreloadDefinition::new("harbor", true).entry("harbor.bank")],
        )
}

fn backends() -> BackendRegistry {
    BackendRegistry::new()
        .register("studio", || Ok(Box::new(LoggingBackend::new("studio", EVENT_LENGTH))))
        .register("arcade", || Ok(Box::new(LoggingBackend::new("arcade", EVENT_LENGTH))))
        .register("broken", || anyhow::bail!("no output device"))
}

/// Runs a short session: a level with a few sounds, focus changes and two
/// implementation swaps while sounds are playing.
pub fn run_scripted_session() -> Result<()> {
    log::info!("=== Starting audio module ===");
    let host = Arc::new(StaticHost::new());
    host.set_level_name("harbor");
    host.set_view_transformation(Some(Transformation::from_position(Vec3::new(
        0.0, 1.8, 0.0,
    ))));
    let dispatcher = Arc::new(SystemEventDispatcher::new());

    let desc = SonarchSystemDesc::default()
        .implementation_name(Some("studio"))
        .update_interval(Duration::from_millis(20));
    let module = SonarchModule::initialize(
        desc,
        Arc::new(backends()),
        Arc::new(controls()),
        host.clone(),
        dispatcher.clone(),
    )?;
    let system = module.system().clone();
    let mut audio_thread = AudioThread::spawn(system.clone(), system.desc().update_interval)?;

    let listener = system.add_request_listener(
        RequestFilter::category(RequestCategory::Callback),
        |info| {
            if let RequestEcho::TriggerFinished(trigger) = &info.echo {
                log::info!("{} finished on {:?}", trigger, info.object);
            }
        },
    );

    log::info!("=== Playing sounds ===");
    let player = system.reserve_audio_object("player")?;
    let music = system.get_audio_trigger_id("play_music");
    let footstep = system.get_audio_trigger_id("footstep");
    let seagulls = system.get_audio_trigger_id("seagulls");
    let speed = system.get_audio_rtpc_id("speed");

    if let Some(trigger) = music {
        system.push_request(AudioRequest::global(ObjectRequest::ExecuteTrigger {
            trigger,
            removal_timeout_ms: 0.0,
        }))?;
    }
    for trigger in [footstep, seagulls].into_iter().flatten() {
        system.push_request(AudioRequest::object(
            player,
            ObjectRequest::ExecuteTrigger {
                trigger,
                removal_timeout_ms: 0.0,
            },
        ))?;
    }
    if let Some(rtpc) = speed {
        system.push_request(AudioRequest::object(
            player,
            ObjectRequest::SetRtpcValue { rtpc, value: 0.7 },
        ))?;
    }
    system.push_request(AudioRequest::listener(ListenerRequest::SetTransformation {
        transformation: Transformation::from_position(Vec3::new(2.0, 1.8, -4.0)),
        listener: None,
    }))?;
    thread::sleep(Duration::from_millis(100));

    log::info!("=== Window loses and regains focus ===");
    dispatcher.dispatch(SystemEvent::Activate {
        active: true,
        minimized: true,
    });
    thread::sleep(Duration::from_millis(50));
    dispatcher.dispatch(SystemEvent::ChangeFocus { focused: true });
    thread::sleep(Duration::from_millis(50));

    log::info!("=== Swapping to 'arcade' while sounds play ===");
    report_swap(module.on_implementation_changed(Some("arcade")));
    thread::sleep(Duration::from_millis(500));

    log::info!("=== Swapping to 'broken' ===");
    report_swap(module.on_implementation_changed(Some("broken")));
    report_swap(module.on_implementation_changed(Some("studio")));

    log::info!("=== Level change ===");
    dispatcher.dispatch(SystemEvent::LevelLoadStart);
    host.set_level_name("");
    dispatcher.dispatch(SystemEvent::LevelPostUnload);
    let stats = system.pool_stats();
    log::info!(
        "Pool: {} / {} bytes used, {} allocations, generation {}",
        stats.used,
        stats.capacity,
        stats.allocations,
        stats.generation
    );

    for event in dispatcher.poll_events() {
        log::info!("System event: {:?}", event);
    }

    system.remove_request_listener(listener);
    audio_thread.stop();
    module.shutdown();
    log::info!("=== Session finished ===");
    Ok(())
}

fn report_swap(outcome: SwapOutcome) {
    match outcome {
        SwapOutcome::Unchanged => log::info!("Implementation unchanged"),
        SwapOutcome::Swapped { name } => log::info!("Now running '{}'", name),
        SwapOutcome::FellBack { requested } => {
            log::warn!("'{}' could not be loaded, running the null implementation", requested)
        }
    }
}
