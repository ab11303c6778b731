use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::render::Button;

pub(crate) fn inline_keyboard(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| InlineKeyboardButton::callback(&button.label, button.action.to_string()))
                .collect()
        })
        .collect();

    InlineKeyboardMarkup::new(keyboard)
}
