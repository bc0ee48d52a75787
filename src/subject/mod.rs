// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

pub mod grouper;
pub mod parser;
pub mod types;

pub use grouper::group;
pub use types::{ReadRole, Subject, SubjectSet};
