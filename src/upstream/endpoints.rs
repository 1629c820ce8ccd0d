//! Typed requests for the provider endpoints the reseller backend uses.
//!
//! Each helper is a thin wrapper over [`UpstreamClient::call`]; the answer is
//! still an [`Outcome`] so rejections stay visible to the caller.

use std::fmt::Display;

use bon::Builder;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use serde_repr::Serialize_repr;

use crate::Result;
use crate::upstream::{Outcome, UpstreamClient};

pub const APP_INFO: &str = "api/open/app/info/v2";
pub const STATISTICS: &str = "api/open/app/statistics/v2";
pub const PRODUCT_QUERY: &str = "api/open/app/product/query/v2";
pub const AREA_LIST: &str = "api/open/app/area/v2";
pub const CITY_LIST: &str = "api/open/app/city/list/v2";
pub const INSTANCE_OPEN: &str = "api/open/app/instance/open/v2";
pub const INSTANCE_RENEW: &str = "api/open/app/instance/renew/v2";
pub const INSTANCE_RELEASE: &str = "api/open/app/instance/release/v2";
pub const INSTANCE_QUERY: &str = "api/open/app/instance/query/v2";
pub const PROXY_INFO: &str = "api/open/app/proxy/info/v2";
pub const USER_CREATE: &str = "api/open/app/user/v2";
pub const WHITELIST_ADD: &str = "api/open/app/proxy/addIpWhiteList/v2";
pub const WHITELIST_REMOVE: &str = "api/open/app/proxy/delIpWhiteList/v2";
pub const FLOW_USAGE_LOG: &str = "api/open/app/proxy/flow/use/log/v2";

/// Provider product families.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize_repr)]
#[repr(u16)]
pub enum ProxyType {
    StaticForeignHome = 103,
    DynamicForeign = 104,
    DynamicMixed = 105,
    DynamicResidential = 201,
}

/// Billing unit for instance durations.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum DurationUnit {
    Day = 1,
    #[default]
    Month = 3,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_order_no: Option<String>,
    #[builder(default)]
    pub proxy_type: Vec<ProxyType>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_code: Option<String>,
}

/// Empty `codes` lists every area.
#[non_exhaustive]
#[derive(Clone, Debug, Default, Builder, Serialize)]
pub struct AreaQuery {
    #[builder(default)]
    pub codes: Vec<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityQuery {
    #[builder(into)]
    pub country_code: String,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_username: Option<String>,
}

/// One product line inside an [`OpenInstance`] order.
#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    #[builder(into)]
    pub product_no: String,
    /// Traffic in MB, for dynamic products.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<u64>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_username: Option<String>,
    #[builder(default = 1)]
    pub count: u32,
    #[builder(default = 30)]
    pub duration: u32,
    #[builder(default)]
    pub unit: DurationUnit,
    #[builder(default = 1)]
    pub cycle_times: u32,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInstance {
    #[builder(into)]
    pub app_order_no: String,
    pub params: Vec<InstanceSpec>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRenewal {
    #[builder(into)]
    pub instance_no: String,
    pub duration: u32,
    #[builder(default)]
    pub unit: DurationUnit,
    #[builder(default = 1)]
    pub cycle_times: u32,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewInstance {
    #[builder(into)]
    pub app_order_no: String,
    pub instances: Vec<InstanceRenewal>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInstance {
    #[builder(into)]
    pub app_order_no: String,
    pub instances: Vec<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    #[builder(into)]
    pub order_no: String,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfoQuery {
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_username: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_type: Option<ProxyType>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_no: Option<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    #[builder(into)]
    pub app_username: String,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<u8>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_name: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    /// Traffic cap in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_flow: Option<u64>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistIp {
    #[builder(into)]
    pub ip: String,
    pub proxy_type: ProxyType,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowUsageQuery {
    #[builder(into)]
    pub app_username: String,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_no: Option<String>,
    #[builder(into)]
    pub start_time: String,
    #[builder(into)]
    pub end_time: String,
    #[builder(default = 1)]
    pub page: u32,
    #[builder(default = 100)]
    pub page_size: u32,
}

/// Order number in the backend's format: prefix, local `YYYYmmddHHMMSS`, id padded to 6.
#[must_use]
pub fn app_order_no<I: Display>(prefix: &str, id: I) -> String {
    app_order_no_at(prefix, id, &Local::now())
}

#[must_use]
pub fn app_order_no_at<I: Display, Tz: TimeZone>(prefix: &str, id: I, at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("{prefix}{}{:0>6}", at.format("%Y%m%d%H%M%S"), id.to_string())
}

impl UpstreamClient {
    pub async fn app_info(&self) -> Result<Outcome> {
        self.call(APP_INFO, &()).await
    }

    pub async fn statistics(&self) -> Result<Outcome> {
        self.call(STATISTICS, &()).await
    }

    pub async fn query_products(&self, query: &ProductQuery) -> Result<Outcome> {
        self.call(PRODUCT_QUERY, query).await
    }

    pub async fn areas(&self, query: &AreaQuery) -> Result<Outcome> {
        self.call(AREA_LIST, query).await
    }

    pub async fn cities(&self, query: &CityQuery) -> Result<Outcome> {
        self.call(CITY_LIST, query).await
    }

    pub async fn open_instance(&self, order: &OpenInstance) -> Result<Outcome> {
        self.call(INSTANCE_OPEN, order).await
    }

    pub async fn renew_instance(&self, order: &RenewInstance) -> Result<Outcome> {
        self.call(INSTANCE_RENEW, order).await
    }

    pub async fn release_instance(&self, order: &ReleaseInstance) -> Result<Outcome> {
        self.call(INSTANCE_RELEASE, order).await
    }

    pub async fn query_order(&self, query: &OrderQuery) -> Result<Outcome> {
        self.call(INSTANCE_QUERY, query).await
    }

    pub async fn proxy_info(&self, query: &ProxyInfoQuery) -> Result<Outcome> {
        self.call(PROXY_INFO, query).await
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<Outcome> {
        self.call(USER_CREATE, user).await
    }

    pub async fn add_whitelist_ip(&self, entry: &WhitelistIp) -> Result<Outcome> {
        self.call(WHITELIST_ADD, entry).await
    }

    pub async fn remove_whitelist_ip(&self, entry: &WhitelistIp) -> Result<Outcome> {
        self.call(WHITELIST_REMOVE, entry).await
    }

    pub async fn flow_usage_log(&self, query: &FlowUsageQuery) -> Result<Outcome> {
        self.call(FLOW_USAGE_LOG, query).await
    }
}
