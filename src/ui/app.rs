use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{RoomCommand, RoomEvent};

use super::components::{chat_area, input_bar};
use super::state::{AppState, ConnectionStatus};

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<RoomCommand>,
    event_receiver: mpsc::Receiver<RoomEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        topic_name: &str,
        command_sender: mpsc::Sender<RoomCommand>,
        event_receiver: mpsc::Receiver<RoomEvent>,
    ) -> Self {
        Self {
            state: AppState::new(topic_name),
            command_sender,
            event_receiver,
        }
    }

    fn handle_room_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
    }

    fn send_command(&mut self, payload: String) {
        if let Err(err) = self
            .command_sender
            .try_send(RoomCommand::SendMessage(payload))
        {
            log::warn!("Failed to send command to chat room: {err}");
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_room_events();

        egui::TopBottomPanel::top("room_header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Welcome to the");
                ui.label(egui::RichText::new(&self.state.topic_name).italics());
                ui.label("chat room");
            });
            match &self.state.status {
                ConnectionStatus::Connecting => {
                    ui.weak("Connecting...");
                }
                ConnectionStatus::Connected => {}
                ConnectionStatus::Failed(reason) => {
                    ui.colored_label(egui::Color32::RED, reason);
                }
            }
        });

        egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
            if let Some(notice) = self.state.notices.last() {
                ui.weak(notice);
            }
            let connected = self.state.status == ConnectionStatus::Connected;
            if let Some(content) = input_bar::render(ui, &mut self.state.input_text, connected) {
                self.send_command(content);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            chat_area::render(ui, &self.state.events);
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
