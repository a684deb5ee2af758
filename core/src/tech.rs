//! Tag technologies and choosing a handler for them.

use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::mifare::CardSize;

/// Prefix of the technology class names reported by Android.
const ANDROID_TECH_PREFIX: &str = "android.nfc.tech.";

/// A protocol capability a tag reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Technology {
    IsoDep,
    NfcA,
    NfcB,
    NfcF,
    NfcV,
    Ndef,
    NdefFormatable,
    MifareClassic,
    MifareUltralight,
    Other(String),
}

impl Technology {
    pub fn name(&self) -> &str {
        use Technology::*;

        match self {
            IsoDep => "IsoDep",
            NfcA => "NfcA",
            NfcB => "NfcB",
            NfcF => "NfcF",
            NfcV => "NfcV",
            Ndef => "Ndef",
            NdefFormatable => "NdefFormatable",
            MifareClassic => "MifareClassic",
            MifareUltralight => "MifareUltralight",
            Other(name) => name,
        }
    }
}

impl FromStr for Technology {
    type Err = Infallible;

    /// Accepts both `IsoDep` and `android.nfc.tech.IsoDep`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Technology::*;

        let name = s.trim();
        Ok(match name.strip_prefix(ANDROID_TECH_PREFIX).unwrap_or(name) {
            "IsoDep" => IsoDep,
            "NfcA" => NfcA,
            "NfcB" => NfcB,
            "NfcF" => NfcF,
            "NfcV" => NfcV,
            "Ndef" => Ndef,
            "NdefFormatable" => NdefFormatable,
            "MifareClassic" => MifareClassic,
            "MifareUltralight" => MifareUltralight,
            _ => Other(name.to_owned()),
        })
    }
}

impl Display for Technology {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The technologies of one tag, in the order they were reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TechList(Vec<Technology>);

impl TechList {
    /// Parses the technology names reported by the discovery layer.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| match name.as_ref().parse::<Technology>() {
                Ok(tech) => tech,
                Err(never) => match never {},
            })
            .collect()
    }

    pub fn contains(&self, tech: &Technology) -> bool {
        self.0.contains(tech)
    }

}

impl FromIterator<Technology> for TechList {
    fn from_iter<T: IntoIterator<Item = Technology>>(iter: T) -> Self {
        let mut list = Vec::new();
        for tech in iter {
            if !list.contains(&tech) {
                list.push(tech);
            }
        }

        Self(list)
    }
}

impl Display for TechList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, tech) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }

            write!(f, "{}", tech)?;
        }

        Ok(())
    }
}

/// ATQA and SAK exchanged during ISO 14443-3A anticollision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NfcAParams {
    pub atqa: [u8; 2],
    pub sak: u8,
}

/// A tag in the field, as handed over by the discovery layer.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    id: Vec<u8>,
    technologies: TechList,
    nfca: Option<NfcAParams>,
    size: Option<CardSize>,
}

impl Tag {
    pub fn new(id: Vec<u8>, technologies: TechList) -> Self {
        Self {
            id,
            technologies,
            ..Default::default()
        }
    }

    pub fn with_nfca(mut self, params: NfcAParams) -> Self {
        self.nfca = Some(params);
        self
    }

    pub fn with_size(mut self, size: CardSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn technologies(&self) -> &TechList {
        &self.technologies
    }

    pub fn nfca(&self) -> Option<NfcAParams> {
        self.nfca
    }

    /// The capacity of the card, if known from the discovery layer or the SAK.
    pub fn size(&self) -> Option<CardSize> {
        self.size
            .or_else(|| self.nfca.and_then(|params| CardSize::from_sak(params.sak)))
    }
}

/// What the caller is about to do with the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Read,
    Write,
}

/// The protocol handler selected for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Sector access through APDUs over ISO 14443-4.
    IsoDep,

    /// Sector access through the native Mifare Classic commands.
    MifareClassic,

    /// Inspection of the anticollision parameters only.
    NfcA,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported tag")]
pub struct UnsupportedTag;

/// Selects the handler for the technologies, preferring IsoDep over anything else.
/// Writing needs IsoDep; reading can fall back to Mifare Classic or NfcA.
pub fn classify(flow: Flow, techs: &TechList) -> Result<Handler, UnsupportedTag> {
    let handler = if techs.contains(&Technology::IsoDep) {
        Some(Handler::IsoDep)
    } else {
        match flow {
            Flow::Write => None,
            Flow::Read if techs.contains(&Technology::MifareClassic) => {
                Some(Handler::MifareClassic)
            }
            Flow::Read if techs.contains(&Technology::NfcA) => Some(Handler::NfcA),
            Flow::Read => None,
        }
    };

    match handler {
        Some(handler) => {
            info!("{:?} tag detected", handler);
            Ok(handler)
        }
        None => {
            debug!("Unsupported tag: [{}]", techs);
            Err(UnsupportedTag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_android_names() {
        let techs = TechList::from_names([
            "android.nfc.tech.IsoDep",
            "android.nfc.tech.NfcA",
            "android.nfc.tech.Felica",
        ]);

        assert!(techs.contains(&Technology::IsoDep));
        assert!(techs.contains(&Technology::NfcA));
        assert!(techs.contains(&Technology::Other("android.nfc.tech.Felica".to_owned())));
        assert_eq!(
            "IsoDep, NfcA, android.nfc.tech.Felica",
            techs.to_string()
        );
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let techs = TechList::from_names(["NfcA", "android.nfc.tech.NfcA"]);

        assert_eq!("NfcA", techs.to_string());
    }

    #[test]
    fn test_isodep_is_preferred() {
        let techs = TechList::from_names(["NfcA", "IsoDep"]);

        assert_eq!(Ok(Handler::IsoDep), classify(Flow::Write, &techs));
        assert_eq!(Ok(Handler::IsoDep), classify(Flow::Read, &techs));
    }

    #[test]
    fn test_unknown_technology_is_unsupported() {
        let techs = TechList::from_names(["Felica"]);

        assert_eq!(Err(UnsupportedTag), classify(Flow::Write, &techs));
        assert_eq!(Err(UnsupportedTag), classify(Flow::Read, &techs));
        assert_eq!(
            Err(UnsupportedTag),
            classify(Flow::Read, &TechList::default())
        );
    }

    #[test]
    fn test_write_needs_isodep() {
        let techs = TechList::from_names(["NfcA", "MifareClassic"]);

        assert_eq!(Err(UnsupportedTag), classify(Flow::Write, &techs));
        assert_eq!(Ok(Handler::MifareClassic), classify(Flow::Read, &techs));
        assert_eq!(
            Ok(Handler::NfcA),
            classify(Flow::Read, &TechList::from_names(["NfcA"]))
        );
    }

    #[test]
    fn test_size_from_sak() {
        let tag = Tag::new(vec![0x04, 0xA2], TechList::from_names(["NfcA"])).with_nfca(
            NfcAParams {
                atqa: [0x00, 0x02],
                sak: 0x18,
            },
        );

        assert_eq!(Some(CardSize::Classic4K), tag.size());
        assert_eq!(
            Some(CardSize::Mini),
            tag.clone().with_size(CardSize::Mini).size()
        );
    }
}
