use std::fmt;

use crate::{config::ConfigRecord, utils::abs_path_string};

pub const VCF_FILE: &str = "VCFfile";
pub const STRAINS: &str = "strains";
pub const SNP_FILE: &str = "SNPfile";
pub const MASKED_INDEX: &str = "NMaskedIndex";
pub const ALLELE_MODE: &str = "allele_mode";

/// AlleleMode
///
/// How allele-specific mapping is to be performed, derived from which of the
/// four allele inputs are supplied
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleMode {
    None,
    CreateAndMap,
    MapOnly,
}

impl AlleleMode {
    /// VCF + strains creates the masked index; SNP file + masked index maps against an
    /// existing one.  Any other mixture of inputs is an error
    pub fn classify(
        vcf: Option<&str>,
        strains: Option<&str>,
        snp_file: Option<&str>,
        masked_index: Option<&str>,
    ) -> anyhow::Result<Self> {
        match (
            vcf.is_some(),
            strains.is_some(),
            snp_file.is_some(),
            masked_index.is_some(),
        ) {
            (false, false, false, false) => Ok(Self::None),
            (true, true, false, false) => Ok(Self::CreateAndMap),
            (false, false, true, true) => Ok(Self::MapOnly),
            _ => Err(anyhow!(
                "Invalid allele-specific mapping options. Supply either --{} and --{} (to create a masked index and map) \
                 or --{} and --{} (to map to an existing masked index), but not a mixture of both",
                VCF_FILE,
                STRAINS,
                SNP_FILE,
                MASKED_INDEX
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CreateAndMap => "create_and_map",
            Self::MapOnly => "map_only",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for AlleleMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify the allele inputs of a configuration record, make the relevant
/// paths absolute and store the resulting mode
pub fn resolve_allele_inputs(cfg: &mut ConfigRecord) -> anyhow::Result<AlleleMode> {
    let mode = AlleleMode::classify(
        cfg.text(VCF_FILE),
        cfg.text(STRAINS),
        cfg.text(SNP_FILE),
        cfg.text(MASKED_INDEX),
    )?;
    let keys: &[&str] = match mode {
        AlleleMode::None => &[],
        AlleleMode::CreateAndMap => &[VCF_FILE],
        AlleleMode::MapOnly => &[SNP_FILE, MASKED_INDEX],
    };
    for k in keys {
        if let Some(p) = cfg.text(k).map(abs_path_string).transpose()? {
            debug!("{}: {}", k, p);
            cfg.set(k, p)
        }
    }
    cfg.set(ALLELE_MODE, mode.as_str());
    debug!("Allele-specific mapping mode: {}", mode);
    Ok(mode)
}
