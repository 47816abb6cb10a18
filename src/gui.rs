//! Graphical fan control using egui/eframe.
//!
//! The attached device lives on a worker thread and the UI talks to it over
//! `mpsc` channels. The worker re-reads the fan every 0.5 s via
//! `recv_timeout`. Closing the window disconnects the channel, the worker
//! drops the device and the fan goes back to firmware control. SIGINT and
//! SIGTERM close the window and stop the worker the same way.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use eframe::egui;
use log::{debug, warn};

use crate::ec::PortIo;
use crate::fan::FanStatus;
use crate::hwmon::AttrId;
use crate::platform::FanDevice;
use crate::shutdown;

// ---------------------------------------------------------------------------
// Worker ↔ UI protocol
// ---------------------------------------------------------------------------

enum WorkerCommand {
    Refresh,
    SetEnable(bool),
    SetPwm(u8),
}

enum WorkerResponse {
    Status(FanStatus),
    Written(String),
    Error(String),
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

fn spawn_worker(
    device: FanDevice<Box<dyn PortIo>>,
    command_rx: mpsc::Receiver<WorkerCommand>,
    response_tx: mpsc::Sender<WorkerResponse>,
    repaint_ctx: egui::Context,
) -> JoinHandle<()> {
    thread::spawn(move || {
        run_worker(
            device,
            &command_rx,
            &response_tx,
            || repaint_ctx.request_repaint(),
            shutdown::requested,
        );
        debug!("gui worker exited, device detached");
    })
}

/// Serve UI commands until the UI goes away or `stop` says so. The device is
/// dropped on return.
fn run_worker(
    device: FanDevice<Box<dyn PortIo>>,
    command_rx: &mpsc::Receiver<WorkerCommand>,
    response_tx: &mpsc::Sender<WorkerResponse>,
    repaint: impl Fn(),
    stop: impl Fn() -> bool,
) {
    let _ = response_tx.send(WorkerResponse::Status(device.status()));
    repaint();

    while !stop() {
        // Wait for a command, or timeout to auto-poll.
        let command = match command_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(command) => command,
            Err(mpsc::RecvTimeoutError::Timeout) => WorkerCommand::Refresh,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let write = match command {
            WorkerCommand::Refresh => None,
            WorkerCommand::SetEnable(manual) => {
                Some((AttrId::PWM_ENABLE, i64::from(u8::from(manual))))
            }
            WorkerCommand::SetPwm(pwm) => Some((AttrId::PWM_INPUT, i64::from(pwm))),
        };
        if let Some((id, value)) = write {
            let response = match device.write(&id, value) {
                Ok(()) => WorkerResponse::Written(format!("Set {} to {}", id, value)),
                Err(error) => WorkerResponse::Error(error.to_string()),
            };
            let _ = response_tx.send(response);
        }
        let _ = response_tx.send(WorkerResponse::Status(device.status()));

        repaint();
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct FanControlApp {
    status: Option<FanStatus>,
    slider_value: f32,
    pending_pwm: Option<(f32, Instant)>,
    dragging: bool,
    status_message: String,
    command_tx: mpsc::Sender<WorkerCommand>,
    response_rx: mpsc::Receiver<WorkerResponse>,
}

impl FanControlApp {
    fn new(
        command_tx: mpsc::Sender<WorkerCommand>,
        response_rx: mpsc::Receiver<WorkerResponse>,
    ) -> Self {
        Self {
            status: None,
            slider_value: 255.0,
            pending_pwm: None,
            dragging: false,
            status_message: "Reading fan...".into(),
            command_tx,
            response_rx,
        }
    }

    fn drain_responses(&mut self) {
        while let Ok(response) = self.response_rx.try_recv() {
            match response {
                WorkerResponse::Status(status) => {
                    if !self.dragging && self.pending_pwm.is_none() {
                        self.slider_value = f32::from(status.cached_duty);
                    }
                    self.status = Some(status);
                }
                WorkerResponse::Written(message) => {
                    self.status_message = message;
                }
                WorkerResponse::Error(message) => {
                    self.status_message = format!("Error: {}", message);
                }
            }
        }
    }

    fn flush_pending_pwm(&mut self) {
        let cutoff = Duration::from_millis(300);
        if let Some((value, timestamp)) = self.pending_pwm {
            if timestamp.elapsed() >= cutoff {
                self.pending_pwm = None;
                let _ = self.command_tx.send(WorkerCommand::SetPwm(value as u8));
            }
        }
    }
}

impl eframe::App for FanControlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if shutdown::requested() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        self.drain_responses();
        self.flush_pending_pwm();

        // Top panel — header.
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.heading("GPD Win 4 Fan");
            ui.add_space(4.0);
        });

        // Bottom panel — status bar.
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.add_space(2.0);
            ui.horizontal(|ui| {
                ui.label("Status:");
                ui.label(&self.status_message);
            });
            ui.add_space(2.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(status) = self.status.clone() else {
                ui.label("Waiting for the embedded controller...");
                return;
            };

            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.set_min_width(ui.available_width());

                ui.strong(&status.name);
                ui.label(format!("{} RPM", status.rpm));

                let is_auto = status.pwm_enable == 0;
                ui.horizontal(|ui| {
                    let mut auto_checked = is_auto;
                    if ui.checkbox(&mut auto_checked, "Auto").changed() {
                        // Manual resumes at the cached duty.
                        self.pending_pwm = None;
                        let _ = self.command_tx.send(WorkerCommand::SetEnable(!auto_checked));
                    }
                });

                let previous_value = self.slider_value;
                ui.horizontal(|ui| {
                    ui.label("PWM");
                    let response = ui.add(
                        egui::Slider::new(&mut self.slider_value, 0.0..=255.0)
                            .step_by(1.0)
                            .fixed_decimals(0),
                    );

                    if response.drag_started() {
                        self.dragging = true;
                    }

                    if response.changed() && self.slider_value != previous_value {
                        self.pending_pwm = Some((self.slider_value, Instant::now()));
                    }

                    if response.drag_stopped() {
                        self.dragging = false;
                        if let Some((value, _)) = self.pending_pwm.take() {
                            let _ = self.command_tx.send(WorkerCommand::SetPwm(value as u8));
                        }
                    }
                });

                if is_auto {
                    ui.label("Firmware curve active, the duty applies when Auto is off.");
                }
            });
        });

        // Request repaint while a PWM value is pending so flush_pending_pwm fires.
        if self.pending_pwm.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        } else {
            // Keep polling the shutdown flag while idle.
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(device: FanDevice<Box<dyn PortIo>>) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([360.0, 260.0])
            .with_min_inner_size([300.0, 200.0]),
        ..Default::default()
    };

    let worker: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
    let worker_slot = Arc::clone(&worker);

    let result = eframe::run_native(
        "GPD Fan Control",
        options,
        Box::new(move |cc| {
            let (command_tx, command_rx) = mpsc::channel();
            let (response_tx, response_rx) = mpsc::channel();

            let handle = spawn_worker(device, command_rx, response_tx, cc.egui_ctx.clone());
            if let Ok(mut slot) = worker_slot.lock() {
                *slot = Some(handle);
            }

            Ok(Box::new(FanControlApp::new(command_tx, response_rx)))
        }),
    )
    .map_err(|error| anyhow::anyhow!("eframe error: {}", error));

    // The app (and with it the command sender) is gone; wait for the worker
    // to detach the device.
    let handle = worker.lock().ok().and_then(|mut slot| slot.take());
    if let Some(handle) = handle {
        if handle.join().is_err() {
            warn!("gui worker panicked");
        }
    }

    result
}
