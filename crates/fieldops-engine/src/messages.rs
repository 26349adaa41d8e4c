// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound reply catalog.
//!
//! Every user-facing text lives here, one function per situation, so the
//! handlers stay free of string literals and the wording stays consistent
//! across the reply and push paths. Quick-reply buttons send the exact
//! texts `commands::Command::parse` recognizes.

use fieldops_core::{FlowKind, OutboundMessage, QuickAction, QuickActionKind, TransactionId};

fn camera_actions(flow: FlowKind) -> Vec<QuickAction> {
    let finish_label = match flow {
        FlowKind::Checkin => "✅ Finish check-in",
        FlowKind::Submission => "✅ Finish submission",
    };
    vec![
        QuickAction {
            label: "📸 Take a photo".to_string(),
            kind: QuickActionKind::Camera,
        },
        QuickAction {
            label: "🖼 Camera roll".to_string(),
            kind: QuickActionKind::CameraRoll,
        },
        QuickAction {
            label: finish_label.to_string(),
            kind: QuickActionKind::Message("done".to_string()),
        },
        QuickAction {
            label: "Cancel".to_string(),
            kind: QuickActionKind::Message("cancel".to_string()),
        },
    ]
}

fn cancel_action() -> QuickAction {
    QuickAction {
        label: "Cancel".to_string(),
        kind: QuickActionKind::Message("cancel".to_string()),
    }
}

pub fn sheets_slow() -> OutboundMessage {
    OutboundMessage::text(
        "The records system is responding slowly right now. Please try again in a moment.",
    )
}

pub fn not_registered() -> OutboundMessage {
    OutboundMessage::text("You are not registered yet. Type 'register' to get started.")
}

pub fn registration_prompt() -> OutboundMessage {
    OutboundMessage::text(
        "Please type your full name and position separated by a comma,\n\
         e.g. Ann Smith, Technician",
    )
}

pub fn already_registered() -> OutboundMessage {
    OutboundMessage::text("You are already registered.")
}

pub fn registration_done() -> OutboundMessage {
    OutboundMessage::text("Registration complete. Type 'check in' or 'submit' to start.")
}

pub fn registration_malformed() -> OutboundMessage {
    OutboundMessage::text(
        "That doesn't look right. Please type your name and position separated by a comma,\n\
         e.g. Ann Smith, Technician",
    )
}

pub fn help_text() -> OutboundMessage {
    OutboundMessage::text("Type 'check in' or 'submit' to start, or 'cancel' to abort an open flow.")
}

/// Ask for a location share to begin a flow. With a capture page configured
/// the first button opens it; without one only the cancel button remains.
pub fn location_request(
    flow: FlowKind,
    txn: &TransactionId,
    liff_id: Option<&str>,
) -> OutboundMessage {
    let purpose = match flow {
        FlowKind::Checkin => "to check in",
        FlowKind::Submission => "to start your submission",
    };
    match liff_id {
        Some(liff_id) => OutboundMessage::with_actions(
            format!("Tap the button below to share your location {purpose}, or cancel."),
            vec![
                QuickAction {
                    label: "Share location".to_string(),
                    kind: QuickActionKind::Uri(format!(
                        "https://liff.line.me/{liff_id}?txn={txn}"
                    )),
                },
                cancel_action(),
            ],
        ),
        None => OutboundMessage::with_actions(
            format!("Please send your location {purpose}, or tap cancel."),
            vec![cancel_action()],
        ),
    }
}

pub fn location_meta_missing() -> OutboundMessage {
    OutboundMessage::text(
        "This location has no usable transaction reference. \
         Please start again with the original command.",
    )
}

pub fn accuracy_too_low(reported_m: f64, ceiling_m: f64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "GPS accuracy {:.0} m is above the {:.0} m limit. \
         Move into the open, wait for a better fix, and share again.",
        reported_m, ceiling_m
    ))
}

pub fn location_stale() -> OutboundMessage {
    OutboundMessage::text("That location fix is too old. Please share your location again.")
}

pub fn outside_radius(flow: FlowKind, distance_m: f64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Outside the {} radius (about {:.0} m away). Move closer to the site and share again.",
        flow.label(),
        distance_m
    ))
}

/// Confirm an accepted location and ask for evidence photos.
pub fn location_accepted(
    flow: FlowKind,
    site_label: Option<&str>,
    distance_m: f64,
) -> OutboundMessage {
    let site = site_label.unwrap_or("the coordinates you sent");
    OutboundMessage::with_actions(
        format!(
            "Location received ✓\nSite: {site} (about {distance_m:.0} m away)\n\
             Please send your evidence photos (one at a time, up to 3)."
        ),
        camera_actions(flow),
    )
}

/// Stray text while the flow is waiting for photos.
pub fn images_prompt(flow: FlowKind) -> OutboundMessage {
    OutboundMessage::with_actions(
        format!(
            "Waiting for your {} photos. Please send an image (up to 3).",
            flow.label()
        ),
        camera_actions(flow),
    )
}

pub fn image_saved(flow: FlowKind, remaining: usize) -> OutboundMessage {
    OutboundMessage::with_actions(
        format!(
            "Photo saved ✓ You can send {remaining} more (one at a time, up to 3)."
        ),
        camera_actions(flow),
    )
}

/// Third submission photo stored; the flow still waits for the explicit
/// finish command.
pub fn submission_images_full() -> OutboundMessage {
    OutboundMessage::text("All 3 photos received ✓ Type 'done' to finish the submission.")
}

pub fn checkin_complete_auto() -> OutboundMessage {
    OutboundMessage::text("All evidence photos received ✅ The check-in is now closed.")
}

pub fn checkin_summary(images: usize) -> OutboundMessage {
    let text = if images >= 3 {
        "Check-in complete ✅ All 3 photos received.".to_string()
    } else if images > 0 {
        format!("Check-in complete ✅ {images} photo(s) received.")
    } else {
        "Check-in complete ✅ (no photos attached)".to_string()
    };
    OutboundMessage::text(text)
}

pub fn submission_summary(images: usize) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Submission recorded ✅ {images} photo(s) received."
    ))
}

pub fn cancelled(flow: FlowKind) -> OutboundMessage {
    OutboundMessage::text(format!("Your {} has been cancelled.", flow.label()))
}

pub fn nothing_in_progress() -> OutboundMessage {
    OutboundMessage::text("There is nothing in progress right now.")
}

pub fn flow_already_open(flow: FlowKind) -> OutboundMessage {
    OutboundMessage::text(format!(
        "You already have an open {}. Finish it or type 'cancel' first.",
        flow.label()
    ))
}

pub fn start_flow_first() -> OutboundMessage {
    OutboundMessage::text(
        "Please start with 'check in' or 'submit' first, then share your location.",
    )
}

pub fn not_at_image_step() -> OutboundMessage {
    OutboundMessage::text("You are not at the photo step yet.")
}

pub fn download_failed() -> OutboundMessage {
    OutboundMessage::text("Could not fetch that image from the chat. Please send it again.")
}

pub fn prepare_failed() -> OutboundMessage {
    OutboundMessage::text(
        "Could not process that image. Please send a JPEG, PNG, or GIF photo.",
    )
}

pub fn storage_not_connected() -> OutboundMessage {
    OutboundMessage::text(
        "Image storage is not connected yet. Please contact an administrator.",
    )
}

pub fn upload_failed() -> OutboundMessage {
    OutboundMessage::text("Uploading the image failed. Please try again.")
}

pub fn row_write_failed() -> OutboundMessage {
    OutboundMessage::text("Could not record the image. Please try again.")
}

pub fn restart_flow(flow: FlowKind) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Could not find your open {} record. Please start the {} again.",
        flow.label(),
        flow.label()
    ))
}

pub fn timeout_warning(seconds_left: u64) -> OutboundMessage {
    let seconds = seconds_left.max(1);
    OutboundMessage::text(format!(
        "Time is almost up: about {seconds} seconds left. \
         Send the remaining photos or type 'done'."
    ))
}

pub fn timed_out(flow: FlowKind, timeout_s: u64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "The {timeout_s} second window has passed. Your {} was closed automatically.",
        flow.label()
    ))
}
