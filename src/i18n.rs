//! Localized message lookup
//!
//! The locale is an explicit value carried by [`Translator`]; components that
//! produce human-facing text receive a translator at construction time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Supported UI languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh-CN")]
    ZhCn,
}

impl Locale {
    /// Parse a locale leniently: `zh-CN`, `zh_CN.UTF-8` and friends map to
    /// Chinese, everything else to English.
    pub fn parse(value: &str) -> Self {
        let base = value
            .split(['.', ':'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if base.starts_with("zh") {
            Locale::ZhCn
        } else {
            Locale::En
        }
    }

    /// BCP-47 tag, used in the HTML `lang` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::ZhCn => "zh-CN",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"));

static EN: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| EN_ENTRIES.iter().copied().collect());

static ZH_CN: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| ZH_CN_ENTRIES.iter().copied().collect());

/// Message translator bound to one locale
#[derive(Debug, Clone, Copy, Default)]
pub struct Translator {
    locale: Locale,
}

impl Translator {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Look up `key` and interpolate `{name}` placeholders from `params`.
    ///
    /// Unknown keys come back unchanged; placeholders without a matching
    /// parameter are left in place.
    pub fn translate(&self, key: &str, params: &[(&str, &dyn fmt::Display)]) -> String {
        let table = match self.locale {
            Locale::En => &*EN,
            Locale::ZhCn => &*ZH_CN,
        };

        let Some(template) = table.get(key) else {
            return key.to_string();
        };

        if params.is_empty() {
            return (*template).to_string();
        }

        PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures<'_>| {
                params
                    .iter()
                    .find(|(name, _)| *name == &caps[1])
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Shorthand for [`translate`](Self::translate) without parameters
    pub fn t(&self, key: &str) -> String {
        self.translate(key, &[])
    }
}

const EN_ENTRIES: &[(&str, &str)] = &[
    ("server.starting", "Starting icon MCP server..."),
    ("server.started", "Icon MCP server ready"),
    ("server.shutdown", "Shutting down icon MCP server"),
    ("server.webServerStarted", "Web server started on port {port}"),
    ("server.webServerAlreadyRunning", "Web server already running on port {port}"),
    ("server.webServerStopped", "Web server stopped"),
    ("search.searchDescription", "Search icons on iconfont.cn and open a web page where the user picks the ones to use"),
    ("search.invalidPage", "Page must be an integer greater than or equal to 1"),
    ("search.invalidPageSize", "Page size must be an integer between 1 and 100"),
    ("search.emptyQuery", "Search keyword must not be empty"),
    ("search.searchFailed", "Icon search failed"),
    ("search.foundIcons", "Found {count} icons"),
    ("search.browseAndSelect", "Open the web URL to browse the results"),
    ("search.clickSelect", "Click icons to select them"),
    ("search.sendToClient", "Press \"Send selected\" to hand them back"),
    ("search.autoReturn", "The selection is returned automatically to the assistant"),
    ("search.pleaseWaitForSelection", "Call check_selection_status with this searchId to wait for the user's choice"),
    ("selection.noSearchFound", "No search found for ID: {searchId}"),
    ("selection.checkingStatus", "Waiting for selection on {searchId}"),
    ("selection.waitingForSelection", "Still waiting for user selection"),
    ("selection.selectionCompleted", "User selected {count} icons"),
    ("selection.selectionFailed", "The selection page was closed before any icons were sent"),
    ("selection.selectionTimeout", "No selection received within {seconds} seconds"),
    ("selection.userSelectedIcons", "User selected {count} icons"),
    ("web.connected", "Connected to the icon server"),
    ("web.title", "Icon Picker"),
    ("web.subtitle", "Select the icons you want and send them back"),
    ("web.sendSelected", "Send selected"),
    ("web.noIconsSelected", "No icons selected"),
    ("web.selectedIcons", "Selected icons"),
    ("web.loading", "Loading..."),
    ("web.previous", "Previous"),
    ("web.next", "Next"),
    ("web.sent", "Selection sent. You can close this page."),
    ("web.notConfigured", "No search ID given. Run a search first."),
    ("web.startServer", "Start the icon selection web server"),
    ("web.stopServer", "Stop the icon selection web server"),
    ("web.checkSelection", "Wait for the user's icon selection for a search"),
    ("cache.statsDescription", "Show icon cache statistics"),
    ("cache.clearDescription", "Clear the icon cache"),
    ("cache.cleared", "Cache cleared"),
    ("cache.expiredCleared", "Expired cache entries cleared"),
    ("download.saveDescription", "Save selected icons to the local filesystem as SVG files"),
    ("download.noIcons", "No icons to save"),
    ("download.saved", "Saved {fileName}"),
    ("download.saveFailed", "Failed to save {name}"),
    ("download.saveCompleted", "Saved {count} icons to {path}"),
    ("error.timeout", "Request timed out"),
    ("error.methodNotFound", "Unknown tool: {method}"),
];

const ZH_CN_ENTRIES: &[(&str, &str)] = &[
    ("server.starting", "正在启动图标 MCP 服务器..."),
    ("server.started", "图标 MCP 服务器已就绪"),
    ("server.shutdown", "正在关闭图标 MCP 服务器"),
    ("server.webServerStarted", "Web 服务器已在端口 {port} 启动"),
    ("server.webServerAlreadyRunning", "Web 服务器已在端口 {port} 运行"),
    ("server.webServerStopped", "Web 服务器已停止"),
    ("search.searchDescription", "在 iconfont.cn 搜索图标，并打开网页让用户挑选"),
    ("search.invalidPage", "页码必须是大于等于 1 的整数"),
    ("search.invalidPageSize", "每页数量必须是 1 到 100 之间的整数"),
    ("search.emptyQuery", "搜索关键词不能为空"),
    ("search.searchFailed", "图标搜索失败"),
    ("search.foundIcons", "找到 {count} 个图标"),
    ("search.browseAndSelect", "打开网页链接浏览搜索结果"),
    ("search.clickSelect", "点击图标进行选择"),
    ("search.sendToClient", "点击“发送所选”提交"),
    ("search.autoReturn", "所选图标会自动返回给助手"),
    ("search.pleaseWaitForSelection", "请使用此 searchId 调用 check_selection_status 等待用户选择"),
    ("selection.noSearchFound", "未找到搜索记录：{searchId}"),
    ("selection.checkingStatus", "正在等待 {searchId} 的选择结果"),
    ("selection.waitingForSelection", "仍在等待用户选择"),
    ("selection.selectionCompleted", "用户选择了 {count} 个图标"),
    ("selection.selectionFailed", "选择页面在发送图标之前已关闭"),
    ("selection.selectionTimeout", "{seconds} 秒内未收到选择结果"),
    ("selection.userSelectedIcons", "用户选择了 {count} 个图标"),
    ("web.connected", "已连接到图标服务器"),
    ("web.title", "图标选择器"),
    ("web.subtitle", "选择需要的图标并发送"),
    ("web.sendSelected", "发送所选"),
    ("web.noIconsSelected", "尚未选择图标"),
    ("web.selectedIcons", "已选图标"),
    ("web.loading", "加载中..."),
    ("web.previous", "上一页"),
    ("web.next", "下一页"),
    ("web.sent", "已发送，可以关闭此页面。"),
    ("web.notConfigured", "缺少搜索 ID，请先执行搜索。"),
    ("web.startServer", "启动图标选择 Web 服务器"),
    ("web.stopServer", "停止图标选择 Web 服务器"),
    ("web.checkSelection", "等待用户对某次搜索的图标选择"),
    ("cache.statsDescription", "查看图标缓存统计"),
    ("cache.clearDescription", "清除图标缓存"),
    ("cache.cleared", "缓存已清除"),
    ("cache.expiredCleared", "已清除过期缓存"),
    ("download.saveDescription", "将所选图标以 SVG 文件保存到本地"),
    ("download.noIcons", "没有可保存的图标"),
    ("download.saved", "已保存 {fileName}"),
    ("download.saveFailed", "保存 {name} 失败"),
    ("download.saveCompleted", "已保存 {count} 个图标到 {path}"),
    ("error.timeout", "请求超时"),
    ("error.methodNotFound", "未知工具：{method}"),
];
