//! Controlled vocabularies of the CMIP3 archive layout.

/// Experiment directory names.
pub const EXPERIMENTS: &[&str] = &[
    "1pctto2x", "1pctto4x", "20c3m", "2xco2", "amip", "commit", "pdcntrl", "picntrl",
    "slabcntl", "sresa1b", "sresa2", "sresb1",
];

/// Experiments run under CFMIP.
pub const CFMIP_EXPERIMENTS: &[&str] = &["2xco2", "slabcntl"];

/// Experiments that became ScenarioMIP in later eras.
pub const SCENARIOMIP_EXPERIMENTS: &[&str] = &["commit", "sresa1b", "sresa2", "sresb1"];

pub const REALMS: &[&str] = &["atm", "ice", "land", "ocn"];

pub const FREQUENCIES: &[&str] = &["3h", "da", "fixed", "mo", "yr"];

/// MIP table ids, upper-cased.
pub const TABLE_IDS: &[&str] = &[
    "A1", "A1A", "A1C", "A1D", "A1E", "A1F", "A2", "A2A", "A3", "A4", "A5", "CF1", "CF3",
    "CF4", "I1", "L1", "O1", "O1A", "O1B", "O1C", "O1D", "O1E", "O1F", "O2", "O3",
];

/// Literal corrections applied to upper-cased source ids, in order.
pub const SOURCE_CASE_FIXES: &[(&str, &str)] = &[
    ("CCCMA", "CCCma"),
    ("HAD", "Had"),
    ("MK3", "Mk3"),
    ("MODEL_E", "ModelE"),
    ("HIRES", "hires"),
    ("MEDRES", "medres"),
    ("T63", "t63"),
];

/// Institution of an unrecognized source id.
pub const UNKNOWN_INSTITUTION: &str = "unknown";

/// Normalized source id to owning institution.
pub const INSTITUTIONS: &[(&str, &str)] = &[
    ("BCC-CM1", "BCC"),
    ("BCCR-BCM2-0", "BCCR"),
    ("CCCma-AGCM4-0", "CCCma"),
    ("CCCma-CGCM3-1", "CCCma"),
    ("CCCma-CGCM3-1-t63", "CCCma"),
    ("CNRM-CM3", "CNRM"),
    ("CSIRO-Mk3-0", "CSIRO"),
    ("CSIRO-Mk3-5", "CSIRO"),
    ("GFDL-CM2-0", "NOAA-GFDL"),
    ("GFDL-CM2-1", "NOAA-GFDL"),
    ("GISS-AOM", "NASA-GISS"),
    ("GISS-ModelE-H", "NASA-GISS"),
    ("GISS-ModelE-R", "NASA-GISS"),
    ("IAP-FGOALS1-0-G", "LASG-IAP"),
    ("INGV-ECHAM4", "INGV"),
    ("INMCM3-0", "INM"),
    ("IPSL-CM4", "IPSL"),
    ("MIROC3-2-hires", "MIROC"),
    ("MIROC3-2-medres", "MIROC"),
    ("MIUB-ECHO-G", "MIUB-KMA"),
    ("MPI-ECHAM5", "MPI-M"),
    ("MRI-CGCM2-3-2A", "MRI"),
    ("NCAR-CCSM3-0", "NCAR"),
    ("NCAR-PCM1", "NCAR"),
    ("UKMO-HadCM3", "MOHC"),
    ("UKMO-HadGEM1", "MOHC"),
    ("UKMO-HadSM3", "MOHC"),
    ("UKMO-HadSM4", "MOHC"),
];
