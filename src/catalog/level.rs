//! Entity levels and the reporting resources they map to.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Minimal entity level of a collector.
///
/// The level decides which entity id (`ad_id`, `ad_group_id`, `campaign_id`, ...)
/// is attached to every row a collector returns. Levels are ordered from the
/// most granular to the least granular one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CollectorLevel {
    /// No entity id; the collector must name its resource explicitly.
    Unknown,
    AdGroupAdAsset,
    AdGroupAd,
    AdGroup,
    Campaign,
    Customer,
    Mcc,
}

/// Query metadata for a [`CollectorLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInfo {
    /// Reporting resource used in the `FROM` clause.
    pub resource_name: &'static str,
    /// Field holding the entity id.
    pub id: &'static str,
    /// Column alias for the entity id.
    pub id_alias: &'static str,
    /// Field holding the entity display name.
    pub name: &'static str,
    /// Column alias for the entity name.
    pub name_alias: &'static str,
    /// Filter keeping only active entities.
    pub active_filter: &'static str,
}

impl LevelInfo {
    /// Render as `<id> AS <alias>`.
    pub fn to_query_field(&self) -> String {
        format!("{} AS {}", self.id, self.id_alias)
    }
}

const AD_GROUP_AD_ASSET: LevelInfo = LevelInfo {
    resource_name: "ad_group_ad_asset_view",
    id: "asset.id",
    id_alias: "asset_id",
    name: "asset.name",
    name_alias: "asset",
    active_filter: "ad_group_ad_asset_view.enabled = TRUE",
};

const AD_GROUP_AD: LevelInfo = LevelInfo {
    resource_name: "ad_group_ad",
    id: "ad_group_ad.ad.id",
    id_alias: "ad_id",
    name: "ad_group_ad.ad.name",
    name_alias: "ad_name",
    active_filter: "ad_group_ad.status = 'ENABLED'",
};

const AD_GROUP: LevelInfo = LevelInfo {
    resource_name: "ad_group",
    id: "ad_group.id",
    id_alias: "ad_group_id",
    name: "ad_group.name",
    name_alias: "ad_group_name",
    active_filter: "ad_group.status = 'ENABLED'",
};

const CAMPAIGN: LevelInfo = LevelInfo {
    resource_name: "campaign",
    id: "campaign.id",
    id_alias: "campaign_id",
    name: "campaign.name",
    name_alias: "campaign_name",
    active_filter: "campaign.status = 'ENABLED'",
};

const CUSTOMER: LevelInfo = LevelInfo {
    resource_name: "customer",
    id: "customer.id",
    id_alias: "customer_id",
    name: "customer.descriptive_name",
    name_alias: "account_name",
    active_filter: "customer.status = 'ENABLED'",
};

impl CollectorLevel {
    /// Levels from the most granular to the least granular one.
    pub const ALL: [CollectorLevel; 7] = [
        Self::Unknown,
        Self::AdGroupAdAsset,
        Self::AdGroupAd,
        Self::AdGroup,
        Self::Campaign,
        Self::Customer,
        Self::Mcc,
    ];

    /// True when `resource` is the name of a level (`ad_group`, `campaign`, ...).
    pub fn is_level_resource(resource: &str) -> bool {
        resource
            .parse::<CollectorLevel>()
            .is_ok_and(|level| level != Self::Unknown)
    }

    /// Level metadata, `None` for [`CollectorLevel::Unknown`].
    pub fn info(self) -> Option<&'static LevelInfo> {
        match self {
            Self::Unknown => None,
            Self::AdGroupAdAsset => Some(&AD_GROUP_AD_ASSET),
            Self::AdGroupAd => Some(&AD_GROUP_AD),
            Self::AdGroup => Some(&AD_GROUP),
            Self::Campaign => Some(&CAMPAIGN),
            Self::Customer | Self::Mcc => Some(&CUSTOMER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_case_insensitive() {
        assert_eq!(
            "ad_group".parse::<CollectorLevel>().unwrap(),
            CollectorLevel::AdGroup
        );
        assert_eq!(
            "CAMPAIGN".parse::<CollectorLevel>().unwrap(),
            CollectorLevel::Campaign
        );
        assert!("keyword".parse::<CollectorLevel>().is_err());
    }

    #[test]
    fn test_level_ordering() {
        assert!(CollectorLevel::AdGroupAd < CollectorLevel::AdGroup);
        assert!(CollectorLevel::AdGroup < CollectorLevel::Campaign);
        assert!(CollectorLevel::Customer < CollectorLevel::Mcc);
    }

    #[test]
    fn test_mcc_shares_customer_resource() {
        assert_eq!(
            CollectorLevel::Mcc.info(),
            CollectorLevel::Customer.info()
        );
        assert!(CollectorLevel::Unknown.info().is_none());
        assert_eq!(
            CollectorLevel::AdGroup.info().unwrap().to_query_field(),
            "ad_group.id AS ad_group_id"
        );
    }

    #[test]
    fn test_level_resource_names() {
        assert!(CollectorLevel::is_level_resource("ad_group"));
        assert!(CollectorLevel::is_level_resource("customer"));
        assert!(!CollectorLevel::is_level_resource("keyword_view"));
        assert!(!CollectorLevel::is_level_resource("unknown"));
        assert_eq!(CollectorLevel::Campaign.info().unwrap().name_alias, "campaign_name");
    }
}
