//! One module per upstream site.

pub mod baidu;
pub mod bilibili;
pub mod csdn;
pub mod douban;
pub mod douyin;
pub mod github;
pub mod hupu;
pub mod ithome;
pub mod quark;
pub mod search360;
pub mod toutiao;
pub mod v2ex;
pub mod weibo;
pub mod zhihu;
