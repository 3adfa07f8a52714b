pub mod maint;
