// SPDX-License-Identifier: Apache-2.0

pub mod boot_image;
pub mod onboarding;
