// src/models/code_lists.rs
//! ICD-11 code list lookups used when rendering DDCC vaccination data.
//!
//! Unknown codes are not an error: callers fall back to the raw code.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static MEDICINAL_PRODUCT_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("XM68M6", "COVID-19 vaccine"),
        ("XM1NL1", "COVID-19 vaccine, inactivated virus"),
        ("XM7HT3", "CoronaVac®"),
        ("XM8866", "BBIBP-CorV"),
        ("XM9TQ1", "KCONVAC"),
        ("XM1G90", "Covaxin"),
        ("XM85P5", "Covi-Vac"),
        ("XM9FQ7", "Hayat-Vax"),
        ("XM97N6", "QazVac"),
        ("XM2YG8", "COVIran Barakat"),
        ("XM3U61", "Inactivated SARS-CoV-2 vaccine"),
        ("XM5DF6", "COVID-19 vaccine, live attenuated virus"),
        ("XM9QW8", "COVID-19 vaccine, non-replicating viral vector"),
        ("XM4YL8", "COVID-19 Vaccine AstraZeneca"),
        ("XM97T2", "Covishield®"),
        ("XM6QV1", "COVID-19 Vaccine Janssen"),
        ("XM1AG7", "Convidecia"),
        ("XM5ZJ4", "Gam-Covid-Vac"),
        ("XM5QM6", "Sputnik-Light"),
        ("XM0CX4", "COVID-19 vaccine, replicating viral vector"),
        ("XM5JC5", "COVID-19 vaccine, virus protein subunit"),
        ("XM3CT4", "Recombinant SARS-CoV-2 vaccine"),
        ("XM3PG0", "Soberana-02"),
        ("XM4EC8", "MVC-COV1901"),
        ("XM6SZ8", "EpiVacCorona"),
        ("XM1J92", "COVID-19 vaccine, virus like particle (VLP)"),
        ("XM6AT1", "COVID-19 vaccine, DNA based"),
        ("XM52P3", "ZyCov-D"),
        ("XM0GQ8", "COVID-19 vaccine, RNA based"),
        ("XM8NQ0", "Comirnaty®"),
        ("XM3DT5", "COVID-19 Vaccine Moderna"),
    ])
});

static DISEASE_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("RA01", "COVID-19"),
        ("RA01.0", "COVID-19, virus identified"),
        ("RA01.1", "COVID-19, virus not identified"),
        ("XN109", "SARS-CoV-2"),
    ])
});

/// Display name for a vaccine brand code, or the code itself when unknown.
pub fn medicinal_product_name(code: &str) -> String {
    MEDICINAL_PRODUCT_NAMES
        .get(code)
        .map(|name| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Display name for a disease code, or the code itself when unknown.
pub fn disease_name(code: &str) -> String {
    DISEASE_NAMES
        .get(code)
        .map(|name| name.to_string())
        .unwrap_or_else(|| code.to_string())
}
