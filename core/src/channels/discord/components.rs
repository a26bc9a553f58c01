//! Discord rendering of outgoing messages and the ticket close button.

use poise::serenity_prelude::{
    builder::{
        CreateActionRow, CreateAttachment, CreateButton, CreateEmbed, CreateEmbedAuthor,
        CreateEmbedFooter, CreateMessage,
    },
    model::{application::ButtonStyle, colour::Colour},
};

use crate::messages::{Attribution, OutgoingMessage};

/// Custom id carried by the close button on a ticket's opening notice.
pub const CLOSE_BUTTON_ID: &str = "modmail:close";

/// Whether a component interaction came from the close button.
pub fn is_close_button(custom_id: &str) -> bool {
    custom_id == CLOSE_BUTTON_ID
}

/// The single-button row attached to ticket notices.
pub fn close_button_row() -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(CLOSE_BUTTON_ID)
            .label("Close")
            .emoji('🔒')
            .style(ButtonStyle::Danger),
    ])
}

fn footer_text(attribution: &Attribution) -> &'static str {
    match attribution {
        Attribution::User(_) => "user",
        Attribution::Staff(_) => "staff",
    }
}

fn embed_colour(attribution: &Attribution) -> Colour {
    match attribution {
        Attribution::User(_) => Colour::BLURPLE,
        Attribution::Staff(_) => Colour::DARK_GREEN,
    }
}

/// Build the Discord message for an [`OutgoingMessage`].
///
/// Relays become an embed carrying the author's name and avatar; notices
/// are sent as plain text. Files keep their order.
pub fn render_message(message: OutgoingMessage) -> CreateMessage {
    let mut builder = CreateMessage::new();

    match &message.attribution {
        Some(attribution) => {
            let author = attribution.author();
            let mut embed_author = CreateEmbedAuthor::new(&author.name);
            if let Some(avatar) = &author.avatar_url {
                embed_author = embed_author.icon_url(avatar);
            }
            let mut embed = CreateEmbed::new()
                .author(embed_author)
                .colour(embed_colour(attribution))
                .footer(CreateEmbedFooter::new(footer_text(attribution)));
            if !message.content.is_empty() {
                embed = embed.description(&message.content);
            }
            builder = builder.embed(embed);
        }
        None => {
            builder = builder.content(&message.content);
        }
    }

    if !message.files.is_empty() {
        builder = builder.add_files(
            message
                .files
                .into_iter()
                .map(|file| CreateAttachment::bytes(file.data, file.filename)),
        );
    }

    if message.close_button {
        builder = builder.components(vec![close_button_row()]);
    }

    builder
}
