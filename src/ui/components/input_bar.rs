use eframe::egui;

/// Single-line composer. Returns the message once the user sends it; input
/// stays disabled until the room is connected.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, connected: bool) -> Option<String> {
    let submitted = ui
        .horizontal(|ui| {
            let hint = if connected {
                "Type a message"
            } else {
                "Waiting for the room..."
            };
            let edit = ui.add_enabled(
                connected,
                egui::TextEdit::singleline(input_text).hint_text(hint),
            );
            let entered = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if entered {
                edit.request_focus();
            }
            let clicked = ui.add_enabled(connected, egui::Button::new("Send")).clicked();
            entered || clicked
        })
        .inner;

    if submitted { take_message(input_text) } else { None }
}

/// Clears the buffer and returns its trimmed content, if any.
fn take_message(input_text: &mut String) -> Option<String> {
    let message = input_text.trim().to_string();
    input_text.clear();
    (!message.is_empty()).then_some(message)
}
