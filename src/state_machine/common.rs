// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Outcome of one state-machine step: move to a new state, stay, or finish,
/// each carrying what the step produced.
#[derive(Debug)]
pub enum Transition<S, R> {
    Next(S, R),
    Stay(R),
    Done(R),
}
