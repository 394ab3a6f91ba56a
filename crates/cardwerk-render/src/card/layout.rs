// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Coordinate table for both card faces, in millimetres from the top-left
// corner of the card.

use std::collections::BTreeMap;

use cardwerk_core::config::mm_to_px_round;

/// Every element placed on a card face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CardField {
    // Front
    Emblem,
    Title,
    Subtitle,
    Photo,
    Surname,
    Names,
    IdNumber,
    BirthDate,
    IssueDate,
    ExpiryDate,
    LicenseNumber,
    Category,
    Restrictions,
    Signature,
    // Back
    RestrictionsHeader,
    CategoryGrid,
    CategoryLegend,
    Barcode,
    Fingerprint,
    Mrz,
    Footer,
}

impl CardField {
    /// Labelled text fields on the front, in print order.
    pub const FRONT_TEXT: [CardField; 9] = [
        CardField::Surname,
        CardField::Names,
        CardField::IdNumber,
        CardField::BirthDate,
        CardField::IssueDate,
        CardField::ExpiryDate,
        CardField::LicenseNumber,
        CardField::Category,
        CardField::Restrictions,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Surname => "SURNAME",
            Self::Names => "NAMES",
            Self::IdNumber => "ID NUMBER",
            Self::BirthDate => "DATE OF BIRTH",
            Self::IssueDate => "ISSUED",
            Self::ExpiryDate => "VALID UNTIL",
            Self::LicenseNumber => "LICENCE NO.",
            Self::Category => "CODE",
            Self::Restrictions => "RESTRICTIONS",
            Self::Signature => "SIGNATURE",
            Self::Fingerprint => "RIGHT THUMB",
            _ => "",
        }
    }
}

/// A box on the card in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Placement {
    pub const fn new(x_mm: f64, y_mm: f64, width_mm: f64, height_mm: f64) -> Self {
        Self {
            x_mm,
            y_mm,
            width_mm,
            height_mm,
        }
    }

    pub fn to_px(&self, dpi: u32) -> PixelRect {
        PixelRect {
            x: mm_to_px_round(self.x_mm, dpi),
            y: mm_to_px_round(self.y_mm, dpi),
            width: mm_to_px_round(self.width_mm, dpi),
            height: mm_to_px_round(self.height_mm, dpi),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Field placements plus the grid pitch used for category cells.
#[derive(Debug, Clone)]
pub struct CardLayout {
    placements: BTreeMap<CardField, Placement>,
    /// Width and height of one category cell.
    pub category_cell_mm: (f64, f64),
    pub category_columns: usize,
}

impl CardLayout {
    /// The standard ID-1 licence layout.
    pub fn standard() -> Self {
        use CardField::*;

        // Field rows on the front start 6.77 mm down, 3.81 mm apart.
        let text_x = 44.87;
        let text_w = 38.00;
        let row = |i: usize| 6.77 + 3.81 * i as f64;

        let mut placements = BTreeMap::from([
            (Emblem, Placement::new(1.69, 1.69, 8.47, 5.08)),
            (Title, Placement::new(0.0, 2.54, 85.60, 2.12)),
            (Subtitle, Placement::new(0.0, 4.66, 85.60, 1.69)),
            (Photo, Placement::new(3.39, 8.47, 18.00, 22.00)),
            (Signature, Placement::new(text_x, 41.06, 30.06, 4.66)),
            (RestrictionsHeader, Placement::new(2.54, 2.54, 60.00, 2.54)),
            (CategoryGrid, Placement::new(2.54, 8.47, 40.64, 5.93)),
            (CategoryLegend, Placement::new(2.54, 15.24, 80.00, 2.12)),
            (Barcode, Placement::new(2.54, 25.40, 54.19, 11.01)),
            (Fingerprint, Placement::new(4.23, 38.10, 10.16, 10.16)),
            (Mrz, Placement::new(16.93, 38.52, 66.00, 7.20)),
            (Footer, Placement::new(16.93, 50.80, 66.00, 1.69)),
        ]);
        for (i, field) in CardField::FRONT_TEXT.iter().enumerate() {
            placements.insert(*field, Placement::new(text_x, row(i), text_w, 3.39));
        }

        Self {
            placements,
            category_cell_mm: (10.16, 2.96),
            category_columns: 4,
        }
    }

    pub fn placement(&self, field: CardField) -> Option<&Placement> {
        self.placements.get(&field)
    }

    /// Pixel box of `field` at `dpi`.
    pub fn rect(&self, field: CardField, dpi: u32) -> Option<PixelRect> {
        self.placement(field).map(|p| p.to_px(dpi))
    }

    /// Override or add a placement.
    pub fn set(&mut self, field: CardField, placement: Placement) {
        self.placements.insert(field, placement);
    }
}

impl Default for CardLayout {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_converts_to_card_pixels() {
        let layout = CardLayout::standard();
        let photo = layout.rect(CardField::Photo, 300).unwrap();
        assert_eq!((photo.x, photo.y), (40, 100));
        assert_eq!((photo.width, photo.height), (213, 260));

        let surname = layout.rect(CardField::Surname, 300).unwrap();
        assert_eq!((surname.x, surname.y), (530, 80));

        let emblem = layout.rect(CardField::Emblem, 300).unwrap();
        assert_eq!((emblem.x, emblem.y, emblem.width, emblem.height), (20, 20, 100, 60));
    }

    #[test]
    fn back_boxes_fit_the_card() {
        let layout = CardLayout::standard();
        for field in [
            CardField::Barcode,
            CardField::Fingerprint,
            CardField::Mrz,
            CardField::Footer,
        ] {
            let r = layout.rect(field, 300).unwrap();
            assert!(r.right() <= 1012 && r.bottom() <= 638, "{field:?}");
        }
        let barcode = layout.rect(CardField::Barcode, 300).unwrap();
        assert_eq!((barcode.width, barcode.height), (640, 130));
    }

    #[test]
    fn every_front_text_field_is_placed() {
        let layout = CardLayout::standard();
        for field in CardField::FRONT_TEXT {
            assert!(layout.placement(field).is_some());
        }
    }
}
