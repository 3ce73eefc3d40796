/// Commands sent from the UI to the chat room.
#[derive(Debug, Clone)]
pub enum RoomCommand {
    SendMessage(String),
    /// Leave the room: drop the subscription and close the session
    Leave,
}
